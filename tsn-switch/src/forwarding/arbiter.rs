/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-egress arbitration state: round-robin pointer over ingress ports,
//! the exclusive in-flight transfer, downstream readiness, and the
//! cut-through / store-and-forward relay rule.

use serde::Serialize;

use crate::frame::{wire_time_ns, FrameDescriptor, FrameHandle, PortId, RelayMode, TrafficClass};

/// Bytes of `frame` received by `now`, capped at its length.
pub fn received_bytes(frame: &FrameDescriptor, now_ns: u64, line_rate_bps: u64) -> u64 {
    let elapsed = now_ns.saturating_sub(frame.arrival_time_ns) as u128;
    let bytes = elapsed * line_rate_bps as u128 / 8_000_000_000;
    bytes.min(frame.length_bytes as u128) as u64
}

/// Earliest relay mode available for `frame` at `now`, if any.
///
/// With cut-through enabled the relay may start once `threshold` bytes are
/// in; otherwise (or for frames shorter than the threshold) the whole frame
/// must have been received.
pub fn relay_mode(
    frame: &FrameDescriptor,
    now_ns: u64,
    line_rate_bps: u64,
    cut_through_threshold: Option<u32>,
) -> Option<RelayMode> {
    let reception_end = frame
        .arrival_time_ns
        .saturating_add(wire_time_ns(frame.length_bytes as u64, line_rate_bps));
    if now_ns >= reception_end {
        return Some(RelayMode::StoreAndForward);
    }
    match cut_through_threshold {
        Some(threshold) if received_bytes(frame, now_ns, line_rate_bps) >= threshold as u64 => {
            Some(RelayMode::CutThrough)
        }
        _ => None,
    }
}

/// A frame occupying an egress port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveTransfer {
    pub ingress: PortId,
    pub handle: FrameHandle,
    pub class: TrafficClass,
    pub arrival_ns: u64,
    pub ends_ns: u64,
    pub mode: RelayMode,
}

/// Arrival-to-completion latency of finished transfers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub total_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
}

impl LatencyStats {
    pub fn record(&mut self, latency_ns: u64) {
        if self.count == 0 || latency_ns < self.min_ns {
            self.min_ns = latency_ns;
        }
        self.max_ns = self.max_ns.max(latency_ns);
        self.count += 1;
        self.total_ns = self.total_ns.saturating_add(latency_ns);
    }

    /// Running average; `None` before the first completion.
    pub fn average_ns(&self) -> Option<u64> {
        (self.count > 0).then(|| self.total_ns / self.count)
    }
}

#[derive(Debug, Clone)]
pub struct EgressArbiter {
    port: PortId,
    rr_pointer: PortId,
    active: Option<ActiveTransfer>,
    downstream_ready: bool,
}

impl EgressArbiter {
    pub fn new(port: PortId) -> Self {
        Self {
            port,
            rr_pointer: 0,
            active: None,
            downstream_ready: true,
        }
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn active(&self) -> Option<&ActiveTransfer> {
        self.active.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn set_downstream_ready(&mut self, ready: bool) {
        self.downstream_ready = ready;
    }

    /// Whether a new grant may be issued now.
    pub fn can_grant(&self) -> bool {
        self.is_idle() && self.downstream_ready
    }

    /// Ingress ports in scan order, starting at the round-robin pointer.
    pub fn scan_order(&self, port_count: usize) -> impl Iterator<Item = PortId> {
        let start = self.rr_pointer % port_count.max(1);
        (0..port_count).map(move |i| (start + i) % port_count)
    }

    /// Occupy the port with `transfer` and move the pointer past the winner.
    pub fn grant(&mut self, transfer: ActiveTransfer, port_count: usize) {
        self.rr_pointer = (transfer.ingress + 1) % port_count.max(1);
        self.active = Some(transfer);
    }

    /// Release the port if the transfer has finished by `now`.
    pub fn complete(&mut self, now_ns: u64) -> Option<ActiveTransfer> {
        match self.active {
            Some(t) if t.ends_ns <= now_ns => self.active.take(),
            _ => None,
        }
    }

    /// Cut an in-flight cut-through relay of `(ingress, handle)` short.
    pub fn abort(&mut self, ingress: PortId, handle: FrameHandle) -> Option<ActiveTransfer> {
        match self.active {
            Some(t)
                if t.ingress == ingress
                    && t.handle == handle
                    && t.mode == RelayMode::CutThrough =>
            {
                self.active.take()
            }
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
