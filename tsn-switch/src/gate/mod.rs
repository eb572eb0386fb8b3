/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Transmission eligibility: cyclic gating plus credit-based shaping.
//!
//! [`GateScheduler`] answers one question: may this frame on
//! `(port, class)` start transmitting at `now`?  The answer combines
//!
//! 1. the gate mask of the current gate control list entry,
//! 2. a guard band: the frame plus `guard_band_ns` must fit in what is left
//!    of the current entry, and
//! 3. for the two stream-reservation classes only, the credit gate
//!    (`credit >= 0`).
//!
//! Denial is not an error.  It is counted per class and the caller retries at
//! the next opportunity.
//!
//! # Design decisions
//!
//! | Topic | Choice |
//! |---|---|
//! | Time stepping | Event-driven: each call advances by the elapsed delta, as a tick walk would |
//! | Time steps | Discontinuities go through `reposition`: no openings counted, no credit |
//! | GCL wrap point | The list length |
//! | Credit layout | `Vec<[Option<CreditState>; 8]>` indexed by port, then class |
//! | Time invalid | [`SyncLossPolicy`], fail-open by default |

pub mod credit;
pub mod gcl;

use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{SwitchConfig, SyncLossPolicy};
use crate::frame::{wire_time_ns, PortId, TrafficClass, NUM_CLASSES};
use credit::CreditState;
use gcl::{CycleTracker, GateControlList, GateMask};

// ── Decisions ─────────────────────────────────────────────────────────────────

/// Why a frame was not granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The class's gate is closed in the current entry.
    GateClosed,
    /// The frame (plus guard band) would straddle the gate-close boundary.
    GuardBand {
        frame_tx_ns: u64,
        guard_band_ns: u64,
        remaining_ns: u64,
    },
    /// Stream-reservation class with negative credit.
    NoCredit { credit_bits: i64 },
    /// Network time is invalid and the policy is fail-closed.
    TimeInvalid,
    /// The port does not exist.
    UnknownPort,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::GateClosed => write!(f, "gate closed"),
            DenyReason::GuardBand {
                frame_tx_ns,
                guard_band_ns,
                remaining_ns,
            } => write!(
                f,
                "guard band: {frame_tx_ns}ns + {guard_band_ns}ns > {remaining_ns}ns remaining"
            ),
            DenyReason::NoCredit { credit_bits } => write!(f, "no credit ({credit_bits} bits)"),
            DenyReason::TimeInvalid => write!(f, "network time invalid"),
            DenyReason::UnknownPort => write!(f, "unknown port"),
        }
    }
}

/// Record of the last grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GrantRecord {
    pub class: TrafficClass,
    pub port: PortId,
    pub grant_time_ns: u64,
    /// When the frame's transmission ends.
    pub end_time_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Granted(GrantRecord),
    Denied(DenyReason),
}

impl GateDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, GateDecision::Granted(_))
    }
}

/// One strict-priority candidate: the head frame of a class for this port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassCandidate {
    pub class: TrafficClass,
    pub length_bytes: u32,
}

/// Counters exported by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub gates_opened: [u64; NUM_CLASSES],
    pub frames_blocked: [u64; NUM_CLASSES],
    pub guard_band_violations: u64,
    pub grants: u64,
}

/// A class currently occupying a port's transmitter.
#[derive(Debug, Clone, Copy)]
struct Transmission {
    class: TrafficClass,
    until_ns: u64,
}

// ── GateScheduler ─────────────────────────────────────────────────────────────

pub struct GateScheduler {
    gcl: GateControlList,
    base_time_ns: u64,
    guard_band_ns: u64,
    line_rate_bps: u64,
    sync_loss_policy: SyncLossPolicy,
    sr_classes: [TrafficClass; 2],
    tracker: CycleTracker,
    /// `credit[port][class]`, `Some` only for shaped classes.
    credit: Vec<[Option<CreditState>; NUM_CLASSES]>,
    transmitting: Vec<Option<Transmission>>,
    last_update_ns: Option<u64>,
    last_grant: Option<GrantRecord>,
    stats: GateStats,
}

impl GateScheduler {
    pub fn new(cfg: &SwitchConfig) -> Self {
        let sched = &cfg.schedule;
        let per_port: [Option<CreditState>; NUM_CLASSES] = std::array::from_fn(|c| {
            TrafficClass::new(c as u8)
                .and_then(|class| cfg.credit_params(class))
                .map(CreditState::new)
        });

        Self {
            gcl: sched.gcl.clone(),
            base_time_ns: sched.base_time_ns,
            guard_band_ns: sched.guard_band_ns,
            line_rate_bps: cfg.line_rate_bps,
            sync_loss_policy: sched.sync_loss_policy,
            sr_classes: [sched.sr_class_a, sched.sr_class_b],
            tracker: CycleTracker::new(),
            credit: vec![per_port; cfg.port_count],
            transmitting: vec![None; cfg.port_count],
            last_update_ns: None,
            last_grant: None,
            stats: GateStats::default(),
        }
    }

    // ── Read side ─────────────────────────────────────────────────────────────

    pub fn gcl(&self) -> &GateControlList {
        &self.gcl
    }

    /// Gate mask published for the current entry.
    pub fn current_mask(&self) -> GateMask {
        self.tracker.mask(&self.gcl)
    }

    pub fn current_index(&self) -> usize {
        self.tracker.index()
    }

    pub fn remaining_in_entry_ns(&self) -> u64 {
        self.tracker.remaining_ns(&self.gcl)
    }

    pub fn credit(&self, port: PortId, class: TrafficClass) -> Option<&CreditState> {
        self.credit.get(port)?[class.index()].as_ref()
    }

    pub fn is_stream_reservation(&self, class: TrafficClass) -> bool {
        self.sr_classes.contains(&class)
    }

    pub fn last_grant(&self) -> Option<GrantRecord> {
        self.last_grant
    }

    pub fn stats(&self) -> &GateStats {
        &self.stats
    }

    // ── Time ──────────────────────────────────────────────────────────────────

    /// Bring cycle position and every credit accumulator up to `now`.
    ///
    /// Idempotent for repeated calls with the same `now`.
    pub fn advance(&mut self, now_ns: u64) {
        let opened = self.tracker.advance(&self.gcl, now_ns, self.base_time_ns);
        for (total, n) in self.stats.gates_opened.iter_mut().zip(opened) {
            *total += n;
        }
        if opened.iter().any(|&n| n > 0) {
            trace!(
                index = self.tracker.index(),
                mask = self.current_mask().0,
                "gate entry advanced"
            );
        }

        let Some(last) = self.last_update_ns.replace(now_ns) else {
            return;
        };
        if now_ns <= last {
            return;
        }

        for (port, classes) in self.credit.iter_mut().enumerate() {
            let tx = self.transmitting[port];
            for (c, state) in classes.iter_mut().enumerate() {
                let Some(state) = state else { continue };
                // Split [last, now) into the transmitting part, then idle.
                let tx_ns = match tx {
                    Some(t) if t.class.index() == c => t.until_ns.min(now_ns).saturating_sub(last),
                    _ => 0,
                };
                if tx_ns > 0 {
                    state.spend_transmitting(tx_ns);
                }
                let idle_ns = (now_ns - last) - tx_ns;
                if idle_ns > 0 {
                    state.accrue_idle(idle_ns);
                }
            }
        }

        for slot in &mut self.transmitting {
            if matches!(slot, Some(t) if t.until_ns <= now_ns) {
                *slot = None;
            }
        }
    }

    /// Move to `now` after a discontinuous time step.
    ///
    /// The cycle position is recomputed from `now` and no gate openings are
    /// counted.  Credit is not charged for the skipped span, and transmissions
    /// that end before `now` are released.
    pub fn reposition(&mut self, now_ns: u64) {
        self.tracker.reposition(&self.gcl, now_ns, self.base_time_ns);
        self.last_update_ns = Some(now_ns);
        for slot in &mut self.transmitting {
            if matches!(slot, Some(t) if t.until_ns <= now_ns) {
                *slot = None;
            }
        }
        debug!(now_ns, index = self.tracker.index(), "gate schedule repositioned");
    }

    /// The transmission on `port` stopped early (relay cut short).
    ///
    /// Credit is brought up to `now` first, so the send slope applies only
    /// to the part actually transmitted.
    pub fn cancel_transmission(&mut self, port: PortId, now_ns: u64) {
        self.advance(now_ns);
        if let Some(slot) = self.transmitting.get_mut(port) {
            if let Some(t) = slot.take() {
                debug!(port, class = %t.class, now_ns, "transmission cancelled");
            }
        }
    }

    // ── Eligibility ───────────────────────────────────────────────────────────

    /// Side-effect-free eligibility check at the scheduler's current position.
    pub fn check(
        &self,
        port: PortId,
        class: TrafficClass,
        length_bytes: u32,
        time_valid: bool,
    ) -> Result<u64, DenyReason> {
        if port >= self.credit.len() {
            return Err(DenyReason::UnknownPort);
        }
        if !time_valid && self.sync_loss_policy == SyncLossPolicy::FailClosed {
            return Err(DenyReason::TimeInvalid);
        }
        if !self.current_mask().is_open(class) {
            return Err(DenyReason::GateClosed);
        }

        let frame_tx_ns = wire_time_ns(length_bytes as u64, self.line_rate_bps);
        let remaining_ns = self.remaining_in_entry_ns();
        if frame_tx_ns.saturating_add(self.guard_band_ns) > remaining_ns {
            return Err(DenyReason::GuardBand {
                frame_tx_ns,
                guard_band_ns: self.guard_band_ns,
                remaining_ns,
            });
        }

        if self.is_stream_reservation(class) {
            if let Some(state) = &self.credit[port][class.index()] {
                if !state.is_open() {
                    return Err(DenyReason::NoCredit {
                        credit_bits: state.credit_bits(),
                    });
                }
            }
        }

        Ok(frame_tx_ns)
    }

    /// Decide whether one frame may start now, updating counters and, on
    /// grant, the port's transmitting state.
    pub fn evaluate(
        &mut self,
        port: PortId,
        class: TrafficClass,
        length_bytes: u32,
        now_ns: u64,
        time_valid: bool,
    ) -> GateDecision {
        self.advance(now_ns);
        match self.check(port, class, length_bytes, time_valid) {
            Ok(frame_tx_ns) => {
                let record = GrantRecord {
                    class,
                    port,
                    grant_time_ns: now_ns,
                    end_time_ns: now_ns.saturating_add(frame_tx_ns),
                };
                self.transmitting[port] = Some(Transmission {
                    class,
                    until_ns: record.end_time_ns,
                });
                self.last_grant = Some(record);
                self.stats.grants += 1;
                debug!(port, class = %class, now_ns, frame_tx_ns, "transmission granted");
                GateDecision::Granted(record)
            }
            Err(reason) => {
                self.stats.frames_blocked[class.index()] += 1;
                if matches!(reason, DenyReason::GuardBand { .. }) {
                    self.stats.guard_band_violations += 1;
                }
                debug!(port, class = %class, now_ns, reason = %reason, "transmission denied");
                GateDecision::Denied(reason)
            }
        }
    }

    /// Strict-priority selection among the head frames of several classes.
    ///
    /// Evaluates from the highest class down and grants the first eligible
    /// one; only the first candidate of each class is considered.  Returns
    /// the index into `candidates` and the grant.
    pub fn select(
        &mut self,
        port: PortId,
        candidates: &[ClassCandidate],
        now_ns: u64,
        time_valid: bool,
    ) -> Option<(usize, GrantRecord)> {
        for class in TrafficClass::descending() {
            let Some(i) = candidates.iter().position(|c| c.class == class) else {
                continue;
            };
            let length_bytes = candidates[i].length_bytes;
            if let GateDecision::Granted(record) =
                self.evaluate(port, class, length_bytes, now_ns, time_valid)
            {
                return Some((i, record));
            }
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::credit::CreditParams;
    use crate::gate::gcl::GateEntry;

    // ── Test helpers ──────────────────────────────────────────────────────────

    fn class(c: u8) -> TrafficClass {
        TrafficClass::new(c).unwrap()
    }

    fn candidate(c: u8) -> ClassCandidate {
        ClassCandidate {
            class: class(c),
            length_bytes: 64,
        }
    }

    /// 1 ms cycle, single all-open entry, 500 ns guard band, 1 Gbit/s.
    fn single_open_entry_config() -> SwitchConfig {
        let mut cfg = SwitchConfig::default();
        cfg.schedule.gcl = GateControlList::new(
            vec![GateEntry {
                gate_mask: GateMask::ALL_OPEN,
                duration_ns: 1_000_000,
            }],
            1_000_000,
        )
        .unwrap();
        cfg.schedule.guard_band_ns = 500;
        cfg
    }

    /// TC7 alone for 200 µs, then TC0-6 for 800 µs.
    fn two_entry_config() -> SwitchConfig {
        let mut cfg = SwitchConfig::default();
        cfg.schedule.gcl = GateControlList::new(
            vec![
                GateEntry {
                    gate_mask: GateMask(0x80),
                    duration_ns: 200_000,
                },
                GateEntry {
                    gate_mask: GateMask(0x7F),
                    duration_ns: 800_000,
                },
            ],
            1_000_000,
        )
        .unwrap();
        cfg
    }

    // ── Guard band (examples A and B) ─────────────────────────────────────────

    #[test]
    fn frame_with_room_before_entry_end_is_granted() {
        let mut s = GateScheduler::new(&single_open_entry_config());
        // 10 µs into the entry: 990 µs remain, far more than 4096 + 500
        let d = s.evaluate(0, class(0), 512, 10_000, true);
        let GateDecision::Granted(rec) = d else {
            panic!("expected grant, got {d:?}")
        };
        assert_eq!(rec.grant_time_ns, 10_000);
        assert_eq!(rec.end_time_ns, 10_000 + 4_096);
        assert_eq!(s.last_grant(), Some(rec));
        assert_eq!(s.stats().grants, 1);
    }

    #[test]
    fn frame_straddling_entry_end_is_denied_and_counted() {
        let mut s = GateScheduler::new(&single_open_entry_config());
        // 300 ns before the entry (and cycle) ends
        let d = s.evaluate(0, class(0), 512, 1_000_000 - 300, true);
        assert_eq!(
            d,
            GateDecision::Denied(DenyReason::GuardBand {
                frame_tx_ns: 4_096,
                guard_band_ns: 500,
                remaining_ns: 300
            })
        );
        assert_eq!(s.stats().guard_band_violations, 1);
        assert_eq!(s.stats().frames_blocked[0], 1);
        assert_eq!(s.stats().grants, 0);
    }

    #[test]
    fn guard_band_boundary_is_inclusive() {
        let mut s = GateScheduler::new(&single_open_entry_config());
        // Exactly 4596 ns left → fits
        assert!(s.evaluate(0, class(0), 512, 1_000_000 - 4_596, true).is_granted());
        let mut s = GateScheduler::new(&single_open_entry_config());
        assert!(!s.evaluate(0, class(0), 512, 1_000_000 - 4_595, true).is_granted());
    }

    // ── Gating ────────────────────────────────────────────────────────────────

    #[test]
    fn closed_gate_denies() {
        let mut s = GateScheduler::new(&two_entry_config());
        assert_eq!(
            s.evaluate(0, class(0), 64, 1_000, true),
            GateDecision::Denied(DenyReason::GateClosed)
        );
        assert!(s.evaluate(0, class(7), 64, 1_000, true).is_granted());
        // Second entry: TC0 open, TC7 closed
        assert!(s.evaluate(1, class(0), 64, 300_000, true).is_granted());
        assert_eq!(
            s.evaluate(1, class(7), 64, 300_000, true),
            GateDecision::Denied(DenyReason::GateClosed)
        );
    }

    #[test]
    fn gates_opened_counts_per_class_transitions() {
        let mut s = GateScheduler::new(&two_entry_config());
        s.advance(0);
        // Three full cycles: each cycle opens TC7 once and TC0-6 once
        s.advance(3_000_000);
        assert_eq!(s.stats().gates_opened, [3; 8]);
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.current_mask(), GateMask(0x80));
    }

    #[test]
    fn decision_is_periodic_in_cycle_time() {
        for t in [1_000u64, 150_000, 250_000, 999_000] {
            let mut a = GateScheduler::new(&two_entry_config());
            let mut b = GateScheduler::new(&two_entry_config());
            let da = a.evaluate(0, class(7), 64, t, true);
            let db = b.evaluate(0, class(7), 64, t + 1_000_000, true);
            assert_eq!(da.is_granted(), db.is_granted(), "t={t}");
        }
    }

    // ── Credit ────────────────────────────────────────────────────────────────

    fn shaped_config(hi_limit_bits: i64) -> SwitchConfig {
        let mut cfg = single_open_entry_config();
        cfg.schedule.guard_band_ns = 0;
        cfg.schedule.credit[3] = Some(CreditParams {
            idle_slope_bps: 125_000_000,
            send_slope_bps: -875_000_000,
            hi_limit_bits,
            lo_limit_bits: -1_000_000,
        });
        cfg
    }

    #[test]
    fn idle_stream_reservation_class_accrues_credit() {
        let mut s = GateScheduler::new(&shaped_config(1_000_000));
        s.advance(0);
        s.advance(1_000_000);
        assert_eq!(s.credit(0, class(3)).unwrap().credit_bits(), 125_000);
    }

    #[test]
    fn accrued_credit_is_clamped_to_hi_limit() {
        let mut s = GateScheduler::new(&shaped_config(50_000));
        s.advance(0);
        s.advance(1_000_000);
        assert_eq!(s.credit(0, class(3)).unwrap().credit_bits(), 50_000);
    }

    #[test]
    fn transmitting_drains_credit_and_closes_credit_gate() {
        let mut s = GateScheduler::new(&shaped_config(1_000_000));
        s.advance(0);
        // Credit 0 → eligible; a 1500-byte frame takes 12 µs
        assert!(s.evaluate(0, class(3), 1_500, 0, true).is_granted());
        s.advance(12_000);
        // 12 µs at 875 Mbit/s = 10_500 bits spent
        assert_eq!(s.credit(0, class(3)).unwrap().credit_bits(), -10_500);
        assert!(matches!(
            s.evaluate(0, class(3), 64, 12_000, true),
            GateDecision::Denied(DenyReason::NoCredit { .. })
        ));
        // Unshaped classes are unaffected
        assert!(s.evaluate(0, class(5), 64, 12_000, true).is_granted());
        // Recovers after 10_500 / 125 Mbit/s = 84 µs idle
        s.advance(12_000 + 84_000);
        assert!(s.credit(0, class(3)).unwrap().is_open());
    }

    #[test]
    fn credit_is_tracked_per_port() {
        let mut s = GateScheduler::new(&shaped_config(1_000_000));
        s.advance(0);
        assert!(s.evaluate(0, class(3), 1_500, 0, true).is_granted());
        s.advance(12_000);
        assert!(!s.credit(0, class(3)).unwrap().is_open());
        assert!(s.credit(1, class(3)).unwrap().is_open());
    }

    #[test]
    fn cancelled_transmission_stops_draining_credit() {
        let mut s = GateScheduler::new(&shaped_config(1_000_000));
        s.advance(0);
        assert!(s.evaluate(0, class(3), 1_500, 0, true).is_granted());
        // Relay cut short after 4 µs: 4 µs at 875 Mbit/s = 3_500 bits spent
        s.cancel_transmission(0, 4_000);
        assert_eq!(s.credit(0, class(3)).unwrap().credit_bits(), -3_500);
        // The remaining 8 µs are idle: +1_000 bits at 125 Mbit/s
        s.advance(12_000);
        assert_eq!(s.credit(0, class(3)).unwrap().credit_bits(), -2_500);
    }

    #[test]
    fn cancel_on_idle_or_unknown_port_is_harmless() {
        let mut s = GateScheduler::new(&shaped_config(1_000_000));
        s.advance(0);
        s.cancel_transmission(1, 1_000);
        s.cancel_transmission(99, 2_000);
        assert_eq!(s.credit(1, class(3)).unwrap().credit_bits(), 250);
    }

    // ── Reposition ────────────────────────────────────────────────────────────

    #[test]
    fn reposition_skips_counting_and_credit() {
        let mut s = GateScheduler::new(&two_entry_config());
        s.advance(0);
        s.reposition(1_000_000_000_000 + 300_000);
        assert_eq!(s.stats().gates_opened, [0; 8]);
        assert_eq!(s.current_index(), 1);
        assert_eq!(s.remaining_in_entry_ns(), 700_000);
        assert_eq!(s.credit(0, class(3)).unwrap().credit_bits(), 0);

        // Ordinary advance continues from the new position
        s.advance(1_000_000_000_000 + 1_000_000);
        assert_eq!(s.stats().gates_opened, [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn reposition_releases_finished_transmissions() {
        let mut s = GateScheduler::new(&shaped_config(1_000_000));
        s.advance(0);
        assert!(s.evaluate(0, class(3), 1_500, 0, true).is_granted());
        s.reposition(50_000);
        s.advance(58_000);
        // 8 µs idle at 125 Mbit/s, nothing spent
        assert_eq!(s.credit(0, class(3)).unwrap().credit_bits(), 1_000);
    }

    // ── Strict priority ───────────────────────────────────────────────────────

    #[test]
    fn select_prefers_highest_eligible_class() {
        let mut s = GateScheduler::new(&two_entry_config());
        let cands = [candidate(1), candidate(7), candidate(4)];
        // Entry 0: only TC7 open
        let (i, rec) = s.select(0, &cands, 1_000, true).unwrap();
        assert_eq!((i, rec.class), (1, class(7)));

        // Entry 1: TC7 closed → TC4 wins over TC1
        let (i, rec) = s.select(1, &cands, 300_000, true).unwrap();
        assert_eq!((i, rec.class), (2, class(4)));
        assert_eq!(s.stats().frames_blocked[7], 1);
        assert_eq!(s.stats().frames_blocked[1], 0);
    }

    #[test]
    fn select_returns_none_when_nothing_eligible() {
        let mut s = GateScheduler::new(&two_entry_config());
        let cands = [candidate(0)];
        assert!(s.select(0, &cands, 1_000, true).is_none());
        assert_eq!(s.stats().frames_blocked[0], 1);
    }

    // ── Sync loss policy ──────────────────────────────────────────────────────

    #[test]
    fn fail_open_keeps_granting_on_invalid_time() {
        let mut s = GateScheduler::new(&single_open_entry_config());
        assert!(s.evaluate(0, class(0), 64, 10_000, false).is_granted());
    }

    #[test]
    fn fail_closed_denies_on_invalid_time() {
        let mut cfg = single_open_entry_config();
        cfg.schedule.sync_loss_policy = SyncLossPolicy::FailClosed;
        let mut s = GateScheduler::new(&cfg);
        assert_eq!(
            s.evaluate(0, class(0), 64, 10_000, false),
            GateDecision::Denied(DenyReason::TimeInvalid)
        );
        assert_eq!(s.stats().frames_blocked[0], 1);
        assert!(s.evaluate(0, class(0), 64, 10_000, true).is_granted());
    }

    // ── Grant property ────────────────────────────────────────────────────────

    #[test]
    fn grant_iff_gate_guard_and_credit_allow() {
        let cfg = {
            let mut c = two_entry_config();
            c.schedule.guard_band_ns = 1_000;
            c
        };
        for t in (0..2_000_000u64).step_by(9_973) {
            for c in 0..8u8 {
                let mut s = GateScheduler::new(&cfg);
                s.advance(t);
                let expected = {
                    let mask_open = s.current_mask().is_open(class(c));
                    let fits =
                        wire_time_ns(256, cfg.line_rate_bps) + 1_000 <= s.remaining_in_entry_ns();
                    let credit_ok = s.credit(0, class(c)).map_or(true, |st| st.is_open());
                    mask_open && fits && credit_ok
                };
                let blocked_before = s.stats().frames_blocked[c as usize];
                let granted = s.evaluate(0, class(c), 256, t, true).is_granted();
                assert_eq!(granted, expected, "t={t} class={c}");
                if !granted {
                    assert_eq!(s.stats().frames_blocked[c as usize], blocked_before + 1);
                }
            }
        }
    }
}
