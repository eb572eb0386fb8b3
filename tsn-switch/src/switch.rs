/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Tick-ordered composition of the three engines.
//!
//! One [`Switch::tick`] runs, in order:
//!
//! 1. time sync (at most one queued inbound message, clock advance, beacon),
//! 2. read network time and validity,
//! 3. gate cycle tracker and credit advance to `now` (a step of more than
//!    [`MAX_CONTINUOUS_STEP_TICKS`] ticks, such as the first offset from a
//!    new master, repositions the schedule instead),
//! 4. completion of finished transfers and the aging sweep,
//! 5. ingest of every frame whose arrival time has been reached (all
//!    learning first, then all resolution),
//! 6. arbitration of every idle, ready, enabled egress port.
//!
//! No phase observes state from a later phase of the same tick.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, SwitchConfig};
use crate::forwarding::{ForwardingEngine, ForwardingStats};
use crate::frame::{FrameDescriptor, FrameHandle, PortId, TransmissionGrant};
use crate::gate::{ClassCandidate, GateScheduler, GateStats};
use crate::timesync::message::SyncMessage;
use crate::timesync::{NetworkTime, SyncState, SyncStats, TimeSyncEngine};

/// Largest network-time step per tick, in nominal ticks, still treated as
/// elapsed time by the gate scheduler.
pub const MAX_CONTINUOUS_STEP_TICKS: u64 = 2;

/// Read-only status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchStatistics {
    pub ticks: u64,
    pub network_time: NetworkTime,
    pub sync_state: SyncState,
    pub sync: SyncStats,
    pub gate: GateStats,
    pub forwarding: ForwardingStats,
    pub learned_addresses: usize,
    pub average_latency_ns: Option<u64>,
    pub pending_arrivals: usize,
}

pub struct Switch {
    cfg: SwitchConfig,
    time: TimeSyncEngine,
    gate: GateScheduler,
    forwarding: ForwardingEngine,
    /// Submitted frames not yet arrived, keyed by `(arrival, submission seq)`.
    arrivals: BTreeMap<(u64, u64), FrameDescriptor>,
    sync_inbox: VecDeque<SyncMessage>,
    next_seq: u64,
    ticks: u64,
    /// Network time of the previous tick.
    last_now: Option<u64>,
}

impl Switch {
    /// # Errors
    /// The configuration violates a load-time invariant.
    pub fn new(cfg: SwitchConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        info!(
            ports = cfg.port_count,
            line_rate_bps = cfg.line_rate_bps,
            tick_ns = cfg.tick_ns,
            gcl_entries = cfg.schedule.gcl.len(),
            cycle_time_ns = cfg.schedule.gcl.cycle_time_ns(),
            "switch created"
        );
        Ok(Self {
            time: TimeSyncEngine::new(cfg.time_sync.clone(), cfg.tick_ns),
            gate: GateScheduler::new(&cfg),
            forwarding: ForwardingEngine::new(&cfg),
            arrivals: BTreeMap::new(),
            sync_inbox: VecDeque::new(),
            next_seq: 0,
            ticks: 0,
            last_now: None,
            cfg,
        })
    }

    // ── Read side ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &SwitchConfig {
        &self.cfg
    }

    pub fn network_time(&self) -> NetworkTime {
        self.time.network_time()
    }

    pub fn time_sync(&self) -> &TimeSyncEngine {
        &self.time
    }

    pub fn gate(&self) -> &GateScheduler {
        &self.gate
    }

    pub fn forwarding(&self) -> &ForwardingEngine {
        &self.forwarding
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn statistics(&self) -> SwitchStatistics {
        let fwd = self.forwarding.stats();
        SwitchStatistics {
            ticks: self.ticks,
            network_time: self.time.network_time(),
            sync_state: self.time.state(),
            sync: self.time.stats().clone(),
            gate: self.gate.stats().clone(),
            forwarding: fwd.clone(),
            learned_addresses: self.forwarding.table().len(),
            average_latency_ns: fwd.latency.average_ns(),
            pending_arrivals: self.arrivals.len(),
        }
    }

    // ── Inputs ────────────────────────────────────────────────────────────────

    /// Queue a decoded frame; it is ingested on the first tick whose network
    /// time reaches its arrival time.  Frames for nonexistent ports are
    /// refused.
    pub fn submit_frame(&mut self, frame: FrameDescriptor) -> bool {
        if frame.ingress_port >= self.cfg.port_count {
            warn!(
                handle = frame.handle,
                ingress = frame.ingress_port,
                ports = self.cfg.port_count,
                "frame for unknown ingress port refused"
            );
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.arrivals.insert((frame.arrival_time_ns, seq), frame);
        true
    }

    /// Queue an inbound sync message; one is consumed per tick.
    pub fn deliver_sync_message(&mut self, msg: SyncMessage) {
        self.sync_inbox.push_back(msg);
    }

    /// Beacons emitted since the last call.
    pub fn take_sync_outbound(&mut self) -> Vec<SyncMessage> {
        self.time.drain_outbound()
    }

    pub fn set_environment(&mut self, temperature_c: f64, voltage_mv: f64) {
        self.time.set_environment(temperature_c, voltage_mv);
    }

    pub fn set_sync_enable(&mut self, enable: bool) {
        self.time.set_sync_enable(enable);
    }

    pub fn set_oscillator_error_ppb(&mut self, error: i64) {
        self.time.set_oscillator_error_ppb(error);
    }

    pub fn set_downstream_ready(&mut self, port: PortId, ready: bool) {
        self.forwarding.set_downstream_ready(port, ready);
    }

    /// Abort a frame: forget it if it has not arrived yet, otherwise let the
    /// forwarding engine drop or cut it short.  Egress ports whose relay was
    /// cut short stop transmitting for the gate scheduler too.
    pub fn abort_frame(&mut self, ingress: PortId, handle: FrameHandle) -> bool {
        let key = self
            .arrivals
            .iter()
            .find(|(_, f)| f.ingress_port == ingress && f.handle == handle)
            .map(|(k, _)| *k);
        if let Some(key) = key {
            self.arrivals.remove(&key);
            debug!(ingress, handle, "frame aborted before arrival");
            return true;
        }
        let outcome = self.forwarding.abort_frame(ingress, handle);
        let now = self.time.network_time().ns;
        for egress in outcome.cut_short.iter() {
            self.gate.cancel_transmission(egress, now);
        }
        !outcome.is_empty()
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    /// Advance one tick and return the grants issued during it.
    pub fn tick(&mut self) -> Vec<TransmissionGrant> {
        self.ticks += 1;

        // 1-2: time base
        let inbound = self.sync_inbox.pop_front();
        let NetworkTime { ns: now, valid } = self.time.tick(inbound);

        // 3: gate position and credit
        let max_step = self.cfg.tick_ns.saturating_mul(MAX_CONTINUOUS_STEP_TICKS);
        match self.last_now.replace(now) {
            Some(last) if now.saturating_sub(last) > max_step => {
                info!(
                    from_ns = last,
                    to_ns = now,
                    "network time stepped, repositioning gate schedule"
                );
                self.gate.reposition(now);
            }
            _ => self.gate.advance(now),
        }

        // 4: housekeeping
        self.forwarding.complete_transfers(now);
        self.forwarding.age_out(now);

        // 5: arrivals
        let due = self.take_due(now);
        if !due.is_empty() {
            self.forwarding.ingest(&due, now);
        }

        // 6: arbitration
        let mut grants = Vec::new();
        for egress in 0..self.cfg.port_count {
            if !self.forwarding.egress_available(egress) {
                continue;
            }
            let candidates = self.forwarding.egress_candidates(egress, now);
            if candidates.is_empty() {
                continue;
            }
            let classes: Vec<ClassCandidate> = candidates
                .iter()
                .map(|c| ClassCandidate {
                    class: c.class,
                    length_bytes: c.length_bytes,
                })
                .collect();
            let Some((i, _)) = self.gate.select(egress, &classes, now, valid) else {
                continue;
            };
            if let Some(grant) = self.forwarding.start_transfer(egress, &candidates[i], now) {
                grants.push(grant);
            }
        }
        grants
    }

    /// Run `n` ticks and collect every grant.
    pub fn run(&mut self, n: u64) -> Vec<TransmissionGrant> {
        let mut grants = Vec::new();
        for _ in 0..n {
            grants.extend(self.tick());
        }
        grants
    }

    fn take_due(&mut self, now: u64) -> Vec<FrameDescriptor> {
        let later = self.arrivals.split_off(&(now.saturating_add(1), 0));
        let due = std::mem::replace(&mut self.arrivals, later);
        due.into_values().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
