/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Address learning, destination resolution and egress arbitration.
//!
//! Frames enter through [`ForwardingEngine::ingest`], which runs every
//! learning step for the batch before resolving any destination, so all
//! lookups in one tick see the same table.  A forwarded frame waits in its
//! ingress port's queue with the set of egress ports it still has to reach;
//! each egress port picks among them with [`ForwardingEngine::egress_candidates`]
//! (round robin over ingress ports, one candidate per class) and
//! [`ForwardingEngine::start_transfer`] once the gate scheduler has chosen a
//! class.
//!
//! Resolution order:
//!
//! 1. ingress admission (port enable, source security, EtherType, VLAN),
//! 2. group destination → flood to VLAN members except ingress,
//! 3. unicast → bound port, drop if it is the ingress port, flood if unknown,
//! 4. port enable mask.

pub mod arbiter;
pub mod policy;
pub mod table;

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SwitchConfig;
use crate::frame::{
    wire_time_ns, FrameDescriptor, FrameHandle, PortId, PortSet, RelayMode, TrafficClass,
    TransmissionGrant, NUM_CLASSES,
};
use arbiter::{relay_mode, ActiveTransfer, EgressArbiter, LatencyStats};
use policy::{DropReason, IngressPolicy};
use table::{ForwardingTable, LearnOutcome};

// ── Decisions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardDecision {
    Forward { ports: PortSet, flooded: bool },
    Drop(DropReason),
}

/// Head-of-class frame an egress port could relay next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EgressCandidate {
    pub class: TrafficClass,
    pub ingress: PortId,
    pub handle: FrameHandle,
    pub length_bytes: u32,
    pub mode: RelayMode,
}

/// What [`ForwardingEngine::abort_frame`] affected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbortOutcome {
    /// The frame was still queued and has been dropped.
    pub dequeued: bool,
    /// Egress ports whose cut-through relay of the frame was cut short.
    pub cut_short: PortSet,
}

impl AbortOutcome {
    pub fn is_empty(&self) -> bool {
        !self.dequeued && self.cut_short.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwardingStats {
    /// Transfers started, per egress port.
    pub forwarded: Vec<u64>,
    /// Frames dropped, per ingress port.
    pub dropped: Vec<u64>,
    pub floods: u64,
    pub security_violations: u64,
    pub vlan_violations: u64,
    pub learn_refused: u64,
    pub station_moves: u64,
    pub aged_out: u64,
    pub cut_through_grants: u64,
    pub store_and_forward_grants: u64,
    pub cut_through_aborts: u64,
    pub latency: LatencyStats,
}

#[derive(Debug, Clone)]
struct PendingFrame {
    desc: FrameDescriptor,
    /// Egress ports not yet served.
    targets: PortSet,
}

// ── ForwardingEngine ──────────────────────────────────────────────────────────

pub struct ForwardingEngine {
    port_count: usize,
    line_rate_bps: u64,
    learning_enable: bool,
    cut_through_threshold: Option<u32>,
    ingress_queue_depth: usize,
    policy: IngressPolicy,
    table: ForwardingTable,
    queues: Vec<VecDeque<PendingFrame>>,
    egress: Vec<EgressArbiter>,
    stats: ForwardingStats,
}

impl ForwardingEngine {
    pub fn new(cfg: &SwitchConfig) -> Self {
        let f = &cfg.forwarding;
        Self {
            port_count: cfg.port_count,
            line_rate_bps: cfg.line_rate_bps,
            learning_enable: f.learning_enable,
            cut_through_threshold: f.cut_through_enable.then_some(f.cut_through_threshold_bytes),
            ingress_queue_depth: f.ingress_queue_depth,
            policy: IngressPolicy::new(cfg),
            table: ForwardingTable::new(f.table_capacity, f.aging_time_ns),
            queues: vec![VecDeque::new(); cfg.port_count],
            egress: (0..cfg.port_count).map(EgressArbiter::new).collect(),
            stats: ForwardingStats {
                forwarded: vec![0; cfg.port_count],
                dropped: vec![0; cfg.port_count],
                ..Default::default()
            },
        }
    }

    // ── Read side ─────────────────────────────────────────────────────────────

    pub fn table(&self) -> &ForwardingTable {
        &self.table
    }

    pub fn stats(&self) -> &ForwardingStats {
        &self.stats
    }

    pub fn arbiter(&self, port: PortId) -> Option<&EgressArbiter> {
        self.egress.get(port)
    }

    pub fn queued(&self, ingress: PortId) -> usize {
        self.queues.get(ingress).map_or(0, VecDeque::len)
    }

    // ── Learning ──────────────────────────────────────────────────────────────

    /// Learn the source binding of `frame`.
    ///
    /// Group source addresses and frames the ingress policy rejects are not
    /// learned.
    pub fn learn(&mut self, frame: &FrameDescriptor) -> LearnOutcome {
        if !self.learning_enable {
            return LearnOutcome::Disabled;
        }
        if frame.src_mac.is_group() || self.policy.admit(frame).is_err() {
            return LearnOutcome::Rejected;
        }

        let outcome = self
            .table
            .learn(frame.src_mac, frame.vlan_id, frame.ingress_port, frame.arrival_time_ns);
        match outcome {
            LearnOutcome::Learned => {
                debug!(
                    mac = %frame.src_mac,
                    vlan = frame.vlan_id,
                    port = frame.ingress_port,
                    "address learned"
                );
            }
            LearnOutcome::Moved { from } => {
                self.stats.station_moves += 1;
                debug!(
                    mac = %frame.src_mac,
                    vlan = frame.vlan_id,
                    from,
                    to = frame.ingress_port,
                    "station moved"
                );
            }
            LearnOutcome::TableFull => {
                self.stats.learn_refused += 1;
                warn!(
                    mac = %frame.src_mac,
                    vlan = frame.vlan_id,
                    capacity = self.table.capacity(),
                    "forwarding table full, address not learned"
                );
            }
            _ => {}
        }
        outcome
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    /// Destination set for `frame` against the current table.  Pure.
    pub fn resolve(&self, frame: &FrameDescriptor, now_ns: u64) -> ForwardDecision {
        if let Err(reason) = self.policy.admit(frame) {
            return ForwardDecision::Drop(reason);
        }

        let flood = self.policy.vlan_members(frame.vlan_id).without(frame.ingress_port);
        let (ports, flooded) = if frame.dst_mac.is_group() {
            (flood, true)
        } else {
            match self.table.lookup(frame.dst_mac, frame.vlan_id, now_ns) {
                Some(e) if e.bound_port == frame.ingress_port => {
                    return ForwardDecision::Drop(DropReason::WouldLoop);
                }
                Some(e) => (PortSet::single(e.bound_port), false),
                None => (flood, true),
            }
        };

        let ports = ports.intersect(self.policy.port_enable_mask());
        if ports.is_empty() {
            return ForwardDecision::Drop(DropReason::NoDestination);
        }
        ForwardDecision::Forward { ports, flooded }
    }

    /// Learn from every frame, then resolve and enqueue every frame.
    pub fn ingest(&mut self, frames: &[FrameDescriptor], now_ns: u64) -> Vec<ForwardDecision> {
        for frame in frames {
            self.learn(frame);
        }

        let mut decisions = Vec::with_capacity(frames.len());
        for frame in frames {
            let mut decision = self.resolve(frame, now_ns);
            if let ForwardDecision::Forward { ports, flooded } = decision {
                decision = self.enqueue(frame, ports, flooded);
            }
            if let ForwardDecision::Drop(reason) = decision {
                self.record_drop(frame, reason);
            }
            decisions.push(decision);
        }
        decisions
    }

    fn enqueue(
        &mut self,
        frame: &FrameDescriptor,
        ports: PortSet,
        flooded: bool,
    ) -> ForwardDecision {
        let queue = &mut self.queues[frame.ingress_port];
        if queue.len() >= self.ingress_queue_depth {
            return ForwardDecision::Drop(DropReason::IngressQueueFull);
        }
        queue.push_back(PendingFrame {
            desc: frame.clone(),
            targets: ports,
        });
        if flooded {
            self.stats.floods += 1;
            debug!(
                handle = frame.handle,
                dst = %frame.dst_mac,
                vlan = frame.vlan_id,
                ports = ports.bits(),
                "frame flooded"
            );
        }
        ForwardDecision::Forward { ports, flooded }
    }

    fn record_drop(&mut self, frame: &FrameDescriptor, reason: DropReason) {
        if let Some(n) = self.stats.dropped.get_mut(frame.ingress_port) {
            *n += 1;
        }
        if reason.is_security() {
            self.stats.security_violations += 1;
            warn!(
                handle = frame.handle,
                src = %frame.src_mac,
                ingress = frame.ingress_port,
                reason = %reason,
                "security violation"
            );
            return;
        }
        if matches!(reason, DropReason::VlanViolation { .. }) {
            self.stats.vlan_violations += 1;
        }
        debug!(
            handle = frame.handle,
            ingress = frame.ingress_port,
            reason = %reason,
            "frame dropped"
        );
    }

    // ── Housekeeping ──────────────────────────────────────────────────────────

    /// Finish every transfer that has ended by `now`, recording latency.
    pub fn complete_transfers(&mut self, now_ns: u64) -> Vec<ActiveTransfer> {
        let mut done = Vec::new();
        for arb in &mut self.egress {
            if let Some(t) = arb.complete(now_ns) {
                let latency = t.ends_ns.saturating_sub(t.arrival_ns);
                self.stats.latency.record(latency);
                debug!(
                    egress = arb.port(),
                    handle = t.handle,
                    latency_ns = latency,
                    "transfer complete"
                );
                done.push(t);
            }
        }
        done
    }

    /// Aging sweep.
    pub fn age_out(&mut self, now_ns: u64) -> usize {
        let removed = self.table.age_out(now_ns);
        if removed > 0 {
            self.stats.aged_out += removed as u64;
            debug!(removed, remaining = self.table.len(), "forwarding entries aged out");
        }
        removed
    }

    pub fn set_downstream_ready(&mut self, port: PortId, ready: bool) {
        if let Some(arb) = self.egress.get_mut(port) {
            arb.set_downstream_ready(ready);
        }
    }

    /// Abort a frame on behalf of the decoding collaborator.
    ///
    /// A still-queued frame is dropped; in-flight cut-through relays of it
    /// are cut short.
    pub fn abort_frame(&mut self, ingress: PortId, handle: FrameHandle) -> AbortOutcome {
        let mut outcome = AbortOutcome::default();

        if let Some(queue) = self.queues.get_mut(ingress) {
            if let Some(pos) = queue.iter().position(|p| p.desc.handle == handle) {
                if let Some(pending) = queue.remove(pos) {
                    self.record_drop(&pending.desc, DropReason::Aborted);
                    outcome.dequeued = true;
                }
            }
        }

        for arb in &mut self.egress {
            if let Some(t) = arb.abort(ingress, handle) {
                self.stats.cut_through_aborts += 1;
                warn!(
                    egress = arb.port(),
                    ingress,
                    handle,
                    class = %t.class,
                    "cut-through relay aborted"
                );
                outcome.cut_short.insert(arb.port());
            }
        }
        outcome
    }

    // ── Arbitration ───────────────────────────────────────────────────────────

    /// Whether `egress` may start a new transfer.
    pub fn egress_available(&self, egress: PortId) -> bool {
        self.policy.is_enabled(egress)
            && self
                .egress
                .get(egress)
                .is_some_and(EgressArbiter::can_grant)
    }

    /// One candidate per class for `egress`: the first relay-ready frame of
    /// that class found scanning ingress ports from the round-robin pointer.
    /// Sorted highest class first.
    pub fn egress_candidates(&self, egress: PortId, now_ns: u64) -> Vec<EgressCandidate> {
        let Some(arb) = self.egress.get(egress) else {
            return Vec::new();
        };
        let mut per_class: [Option<EgressCandidate>; NUM_CLASSES] = [None; NUM_CLASSES];

        for ingress in arb.scan_order(self.port_count) {
            for pending in &self.queues[ingress] {
                if !pending.targets.contains(egress) {
                    continue;
                }
                let class = pending.desc.class();
                if per_class[class.index()].is_some() {
                    continue;
                }
                let Some(mode) = relay_mode(
                    &pending.desc,
                    now_ns,
                    self.line_rate_bps,
                    self.cut_through_threshold,
                ) else {
                    continue;
                };
                per_class[class.index()] = Some(EgressCandidate {
                    class,
                    ingress,
                    handle: pending.desc.handle,
                    length_bytes: pending.desc.length_bytes,
                    mode,
                });
            }
        }

        per_class.into_iter().rev().flatten().collect()
    }

    /// Give `egress` exclusively to `candidate` for the frame's duration.
    pub fn start_transfer(
        &mut self,
        egress: PortId,
        candidate: &EgressCandidate,
        now_ns: u64,
    ) -> Option<TransmissionGrant> {
        if egress >= self.egress.len() {
            return None;
        }
        let queue = self.queues.get_mut(candidate.ingress)?;
        let pos = queue.iter().position(|p| p.desc.handle == candidate.handle)?;

        let desc = queue[pos].desc.clone();
        queue[pos].targets.remove(egress);
        if queue[pos].targets.is_empty() {
            queue.remove(pos);
        }

        let transfer = ActiveTransfer {
            ingress: candidate.ingress,
            handle: desc.handle,
            class: candidate.class,
            arrival_ns: desc.arrival_time_ns,
            ends_ns: now_ns
                .saturating_add(wire_time_ns(desc.length_bytes as u64, self.line_rate_bps)),
            mode: candidate.mode,
        };
        self.egress.get_mut(egress)?.grant(transfer, self.port_count);

        self.stats.forwarded[egress] += 1;
        match candidate.mode {
            RelayMode::CutThrough => self.stats.cut_through_grants += 1,
            RelayMode::StoreAndForward => self.stats.store_and_forward_grants += 1,
        }

        let grant = TransmissionGrant {
            port: egress,
            frame: desc.handle,
            priority: candidate.class,
            grant_time_ns: now_ns,
            mode: candidate.mode,
            untagged: self.policy.is_untagged(desc.vlan_id, egress),
        };
        debug!(
            egress,
            ingress = candidate.ingress,
            handle = desc.handle,
            class = %candidate.class,
            mode = ?candidate.mode,
            "transfer started"
        );
        Some(grant)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MacAddress;

    // ── Test helpers ──────────────────────────────────────────────────────────

    const UNKNOWN: MacAddress = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn host(n: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, n])
    }

    fn frame(
        handle: u64,
        src: MacAddress,
        dst: MacAddress,
        vlan: u16,
        ingress: PortId,
        at: u64,
    ) -> FrameDescriptor {
        FrameDescriptor {
            handle,
            src_mac: src,
            dst_mac: dst,
            ether_type: 0x0800,
            vlan_id: vlan,
            priority: 0,
            length_bytes: 64,
            arrival_time_ns: at,
            ingress_port: ingress,
        }
    }

    /// Four ports, VLAN 10 spanning all of them.
    fn engine() -> ForwardingEngine {
        ForwardingEngine::new(&SwitchConfig::default())
    }

    /// Grant whatever `egress` has, highest class first, with no gating.
    fn drain_one(e: &mut ForwardingEngine, egress: PortId, now: u64) -> Option<TransmissionGrant> {
        let cands = e.egress_candidates(egress, now);
        let first = cands.first()?;
        e.start_transfer(egress, first, now)
    }

    // ── Destination resolution (example D) ────────────────────────────────────

    #[test]
    fn unknown_unicast_floods_then_learned_binding_is_used() {
        let mut e = engine();
        let d = e.ingest(&[frame(1, host(1), UNKNOWN, 10, 0, 0)], 0);
        assert_eq!(
            d[0],
            ForwardDecision::Forward {
                ports: PortSet::from_iter([1, 2, 3]),
                flooded: true
            }
        );
        assert_eq!(e.stats().floods, 1);

        // UNKNOWN replies from port 2
        e.ingest(&[frame(2, UNKNOWN, host(1), 10, 2, 1_000)], 1_000);
        let d = e.ingest(&[frame(3, host(1), UNKNOWN, 10, 0, 2_000)], 2_000);
        assert_eq!(
            d[0],
            ForwardDecision::Forward {
                ports: PortSet::single(2),
                flooded: false
            }
        );
        // Reply was resolved against the binding learned from frame 1
        assert_eq!(e.table().lookup(host(1), 10, 2_000).unwrap().bound_port, 0);
    }

    #[test]
    fn broadcast_floods_vlan_members_except_ingress() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.vlan_membership[20] = PortSet::from_iter([0, 1, 3]);
        let e = ForwardingEngine::new(&cfg);
        let d = e.resolve(&frame(1, host(1), MacAddress::BROADCAST, 20, 3, 0), 0);
        assert_eq!(
            d,
            ForwardDecision::Forward {
                ports: PortSet::from_iter([0, 1]),
                flooded: true
            }
        );
    }

    #[test]
    fn destination_on_ingress_port_is_dropped() {
        let mut e = engine();
        e.ingest(&[frame(1, host(2), host(1), 1, 1, 0)], 0);
        let d = e.ingest(&[frame(2, host(1), host(2), 1, 1, 10)], 10);
        assert_eq!(d[0], ForwardDecision::Drop(DropReason::WouldLoop));
        assert_eq!(e.stats().dropped[1], 1);
    }

    #[test]
    fn port_enable_mask_filters_destinations() {
        let mut cfg = SwitchConfig::default();
        cfg.port_enable_mask = PortSet::from_iter([0, 1, 2]);
        let e = ForwardingEngine::new(&cfg);
        let d = e.resolve(&frame(1, host(1), MacAddress::BROADCAST, 1, 0, 0), 0);
        assert_eq!(
            d,
            ForwardDecision::Forward {
                ports: PortSet::from_iter([1, 2]),
                flooded: true
            }
        );
    }

    #[test]
    fn single_member_vlan_has_no_destination() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.vlan_membership[5] = PortSet::single(0);
        let mut e = ForwardingEngine::new(&cfg);
        let d = e.ingest(&[frame(1, host(1), MacAddress::BROADCAST, 5, 0, 0)], 0);
        assert_eq!(d[0], ForwardDecision::Drop(DropReason::NoDestination));
    }

    #[test]
    fn security_violation_is_dropped_counted_and_not_learned() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.security_enable = true;
        cfg.forwarding.allowed_mac_base = MacAddress::new([0x02, 0, 0, 0, 0, 0]);
        cfg.forwarding.allowed_mac_mask = MacAddress::new([0xFF, 0, 0, 0, 0, 0]);
        let mut e = ForwardingEngine::new(&cfg);

        let rogue = MacAddress::new([0x04, 0, 0, 0, 0, 9]);
        let d = e.ingest(&[frame(1, rogue, host(1), 1, 3, 0)], 0);
        assert_eq!(d[0], ForwardDecision::Drop(DropReason::SecurityViolation));
        assert_eq!(e.stats().security_violations, 1);
        assert!(e.table().is_empty());
    }

    // ── Learning ──────────────────────────────────────────────────────────────

    #[test]
    fn learning_happens_before_resolution_within_a_batch() {
        let mut e = engine();
        // Second frame in the batch announces host(2) on port 3; the first
        // frame, addressed to host(2), already sees that binding.
        let d = e.ingest(
            &[frame(1, host(1), host(2), 1, 0, 0), frame(2, host(2), host(9), 1, 3, 0)],
            0,
        );
        assert_eq!(
            d[0],
            ForwardDecision::Forward {
                ports: PortSet::single(3),
                flooded: false
            }
        );
    }

    #[test]
    fn full_table_is_signalled() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.table_capacity = 1;
        let mut e = ForwardingEngine::new(&cfg);
        assert_eq!(e.learn(&frame(1, host(1), UNKNOWN, 1, 0, 0)), LearnOutcome::Learned);
        assert_eq!(e.learn(&frame(2, host(2), UNKNOWN, 1, 1, 0)), LearnOutcome::TableFull);
        assert_eq!(e.stats().learn_refused, 1);
    }

    #[test]
    fn station_move_is_counted() {
        let mut e = engine();
        e.learn(&frame(1, host(1), UNKNOWN, 1, 0, 0));
        assert_eq!(e.learn(&frame(2, host(1), UNKNOWN, 1, 2, 10)), LearnOutcome::Moved { from: 0 });
        assert_eq!(e.stats().station_moves, 1);
    }

    #[test]
    fn learning_disabled_or_group_source() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.learning_enable = false;
        let mut e = ForwardingEngine::new(&cfg);
        assert_eq!(e.learn(&frame(1, host(1), UNKNOWN, 1, 0, 0)), LearnOutcome::Disabled);

        let mut e = engine();
        assert_eq!(
            e.learn(&frame(1, MacAddress::BROADCAST, UNKNOWN, 1, 0, 0)),
            LearnOutcome::Rejected
        );
    }

    #[test]
    fn aging_sweep_forgets_silent_hosts() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.aging_time_ns = 10_000;
        let mut e = ForwardingEngine::new(&cfg);
        e.ingest(&[frame(1, host(2), UNKNOWN, 1, 2, 0)], 0);
        assert_eq!(e.age_out(9_999), 0);
        assert_eq!(e.age_out(10_000), 1);
        assert_eq!(e.stats().aged_out, 1);
        let d = e.resolve(&frame(2, host(1), host(2), 1, 0, 10_000), 10_000);
        assert!(matches!(d, ForwardDecision::Forward { flooded: true, .. }));
    }

    // ── Queues and arbitration ────────────────────────────────────────────────

    #[test]
    fn ingress_queue_overflow_tail_drops() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.ingress_queue_depth = 2;
        let mut e = ForwardingEngine::new(&cfg);
        let frames: Vec<_> = (0..3).map(|h| frame(h, host(1), UNKNOWN, 1, 0, 0)).collect();
        let d = e.ingest(&frames, 0);
        assert_eq!(d[2], ForwardDecision::Drop(DropReason::IngressQueueFull));
        assert_eq!(e.queued(0), 2);
    }

    #[test]
    fn flooded_frame_leaves_queue_after_last_target() {
        let mut e = engine();
        e.ingest(&[frame(1, host(1), MacAddress::BROADCAST, 1, 0, 0)], 0);
        // 64 bytes = 512 ns to receive
        for egress in 1..=3 {
            assert_eq!(e.queued(0), 1);
            let g = drain_one(&mut e, egress, 512).unwrap();
            assert_eq!((g.port, g.frame, g.mode), (egress, 1, RelayMode::StoreAndForward));
        }
        assert_eq!(e.queued(0), 0);
        assert_eq!(e.stats().forwarded, vec![0, 1, 1, 1]);
    }

    #[test]
    fn frame_not_relay_ready_before_reception_without_cut_through() {
        let mut e = engine();
        e.ingest(&[frame(1, host(1), MacAddress::BROADCAST, 1, 0, 0)], 0);
        assert!(e.egress_candidates(1, 511).is_empty());
        assert_eq!(e.egress_candidates(1, 512).len(), 1);
    }

    #[test]
    fn cut_through_starts_before_full_reception() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.cut_through_enable = true;
        cfg.forwarding.cut_through_threshold_bytes = 64;
        let mut e = ForwardingEngine::new(&cfg);
        let mut f = frame(1, host(1), MacAddress::BROADCAST, 1, 0, 0);
        f.length_bytes = 1_500;
        e.ingest(&[f], 0);

        assert!(e.egress_candidates(1, 500).is_empty());
        let g = drain_one(&mut e, 1, 512).unwrap();
        assert_eq!(g.mode, RelayMode::CutThrough);
        assert_eq!(e.stats().cut_through_grants, 1);
    }

    #[test]
    fn egress_is_exclusive_until_transfer_completes() {
        let mut e = engine();
        e.ingest(
            &[
                frame(1, host(1), host(9), 1, 0, 0),
                frame(2, host(2), host(9), 1, 1, 0),
            ],
            0,
        );
        drain_one(&mut e, 3, 512).unwrap();
        assert!(!e.egress_available(3));
        // 64 bytes take 512 ns on egress too
        assert!(e.complete_transfers(1_023).is_empty());
        let done = e.complete_transfers(1_024);
        assert_eq!(done.len(), 1);
        assert_eq!(e.stats().latency.average_ns(), Some(1_024));
        assert!(e.egress_available(3));
    }

    #[test]
    fn round_robin_serves_every_ingress_within_n_grants() {
        let mut e = engine();
        // Ports 0, 1, 2 all keep sending to port 3
        let mut handle = 0;
        for _ in 0..5 {
            let batch: Vec<_> = (0..3)
                .map(|p| {
                    handle += 1;
                    frame(handle, host(p as u8 + 1), MacAddress::BROADCAST, 1, p, 0)
                })
                .collect();
            e.ingest(&batch, 0);
        }

        let mut now = 512;
        let mut winners = Vec::new();
        for _ in 0..9 {
            let cands = e.egress_candidates(3, now);
            e.start_transfer(3, &cands[0], now).unwrap();
            winners.push(cands[0].ingress);
            now += 512;
            e.complete_transfers(now);
        }
        for window in winners.windows(3) {
            let mut seen: Vec<_> = window.to_vec();
            seen.sort_unstable();
            assert_eq!(seen, vec![0, 1, 2], "window {window:?}");
        }
    }

    #[test]
    fn candidates_are_one_per_class_highest_first() {
        let mut e = engine();
        let mut low = frame(1, host(1), host(9), 1, 0, 0);
        low.priority = 1;
        let mut high = frame(2, host(2), host(9), 1, 1, 0);
        high.priority = 6;
        let mut low2 = frame(3, host(3), host(9), 1, 2, 0);
        low2.priority = 1;
        e.ingest(&[low, high, low2], 0);

        let c = e.egress_candidates(3, 512);
        assert_eq!(c.len(), 2);
        assert_eq!((c[0].class.get(), c[0].ingress), (6, 1));
        assert_eq!((c[1].class.get(), c[1].ingress), (1, 0));
    }

    #[test]
    fn downstream_not_ready_makes_egress_unavailable() {
        let mut e = engine();
        e.set_downstream_ready(2, false);
        assert!(!e.egress_available(2));
        e.set_downstream_ready(2, true);
        assert!(e.egress_available(2));
    }

    #[test]
    fn untagged_vlan_egress_is_marked() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.vlan_untag[1] = PortSet::single(2);
        let mut e = ForwardingEngine::new(&cfg);
        e.ingest(&[frame(1, host(1), MacAddress::BROADCAST, 1, 0, 0)], 0);
        assert!(drain_one(&mut e, 2, 512).unwrap().untagged);
        assert!(!drain_one(&mut e, 1, 512).unwrap().untagged);
    }

    // ── Abort ─────────────────────────────────────────────────────────────────

    #[test]
    fn aborting_a_queued_frame_drops_it() {
        let mut e = engine();
        e.ingest(&[frame(1, host(1), MacAddress::BROADCAST, 1, 0, 0)], 0);
        let outcome = e.abort_frame(0, 1);
        assert!(outcome.dequeued);
        assert!(outcome.cut_short.is_empty());
        assert_eq!(e.queued(0), 0);
        assert_eq!(e.stats().dropped[0], 1);
        assert!(e.abort_frame(0, 1).is_empty());
    }

    #[test]
    fn aborting_cut_through_relay_frees_egress() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.cut_through_enable = true;
        let mut e = ForwardingEngine::new(&cfg);
        let mut f = frame(1, host(1), host(9), 1, 0, 0);
        f.length_bytes = 1_500;
        e.ingest(&[f], 0);
        // Flooded to 1, 2, 3; relay on 1 only
        drain_one(&mut e, 1, 600).unwrap();

        let outcome = e.abort_frame(0, 1);
        assert!(outcome.dequeued);
        assert_eq!(outcome.cut_short, PortSet::single(1));
        assert_eq!(e.stats().cut_through_aborts, 1);
        assert!(e.egress_available(1));
        assert_eq!(e.queued(0), 0);
        assert!(e.complete_transfers(1_000_000).is_empty());
    }
}
