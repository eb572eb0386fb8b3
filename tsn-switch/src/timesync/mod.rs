/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Network time base and master/slave synchronisation.
//!
//! [`TimeSyncEngine`] gives the whole switch one logical clock.  It elects a
//! master by lowest [`ClockIdentity`], converges the local clock onto the
//! master's time while in `Slave`, and emits periodic beacons while it is
//! `Master` itself.
//!
//! ```text
//!            sync_enable            announce (better id)          first sync
//!   Init ──────────────► Listening ─────────────────► Uncalibrated ─────────► Slave
//!     │ force_master        │  ▲                          │  ▲                  │
//!     ▼                     │  └──── sync timeout ───────┘  └─ better announce ─┤
//!   Master ◄─ announce ─────┘  ▲                                               │
//!            timeout           └────────────────── sync timeout ──────────────┘
//! ```
//!
//! Loss of synchronisation is never fatal: the engine falls back to the
//! free-running local clock with validity cleared and re-enters election.
//! All timeouts are tick counters, never wall-clock waits.
//!
//! Published network time never decreases, even when a correction steps the
//! offset backwards; the published value holds until the estimate catches up.

pub mod clock;
pub mod message;

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TimeSyncConfig;
use clock::LocalClock;
use message::{ClockIdentity, SyncMessage};

// ── Public data structures ────────────────────────────────────────────────────

/// Synchronisation role of this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SyncState {
    #[default]
    Init,
    Listening,
    Uncalibrated,
    Slave,
    Master,
    /// Sync disabled at runtime: free-running, messages ignored.
    Passive,
}

/// Network time as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NetworkTime {
    pub ns: u64,
    /// `true` while synchronised (Slave) or authoritative (Master).
    pub valid: bool,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub state_changes: u64,
    pub announces_accepted: u64,
    pub syncs_accepted: u64,
    pub messages_ignored: u64,
    pub beacons_sent: u64,
    pub sync_losses: u64,
    pub last_residual_ns: i64,
}

// ── TimeSyncEngine ────────────────────────────────────────────────────────────

pub struct TimeSyncEngine {
    cfg: TimeSyncConfig,
    nominal_tick_ns: u64,
    state: SyncState,
    clock: LocalClock,
    offset_ns: i64,
    published_ns: u64,
    best_master: Option<ClockIdentity>,
    ticks_since_announce: u64,
    ticks_since_sync: u64,
    ticks_since_beacon: u64,
    outbound: VecDeque<SyncMessage>,
    stats: SyncStats,
}

impl TimeSyncEngine {
    pub fn new(cfg: TimeSyncConfig, nominal_tick_ns: u64) -> Self {
        Self {
            cfg,
            nominal_tick_ns,
            state: SyncState::Init,
            clock: LocalClock::new(),
            offset_ns: 0,
            published_ns: 0,
            best_master: None,
            ticks_since_announce: 0,
            ticks_since_sync: 0,
            ticks_since_beacon: 0,
            outbound: VecDeque::new(),
            stats: SyncStats::default(),
        }
    }

    // ── Read side ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn identity(&self) -> ClockIdentity {
        self.cfg.clock_identity
    }

    pub fn best_master(&self) -> Option<ClockIdentity> {
        self.best_master
    }

    pub fn network_time(&self) -> NetworkTime {
        NetworkTime {
            ns: self.published_ns,
            valid: matches!(self.state, SyncState::Slave | SyncState::Master),
        }
    }

    pub fn offset_ns(&self) -> i64 {
        self.offset_ns
    }

    pub fn clock(&self) -> &LocalClock {
        &self.clock
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Beacons produced since the last drain, in emission order.
    pub fn drain_outbound(&mut self) -> Vec<SyncMessage> {
        self.outbound.drain(..).collect()
    }

    // ── External inputs ───────────────────────────────────────────────────────

    /// Enable or disable synchronisation at runtime.
    ///
    /// Disabling from any state other than `Init` parks the engine in
    /// `Passive`; re-enabling from `Passive` restarts election.
    pub fn set_sync_enable(&mut self, enable: bool) {
        self.cfg.sync_enable = enable;
        match (enable, self.state) {
            (false, SyncState::Init | SyncState::Passive) => {}
            (false, _) => self.transition(SyncState::Passive, "sync disabled"),
            (true, SyncState::Passive) => {
                self.best_master = None;
                self.transition(SyncState::Listening, "sync re-enabled");
            }
            (true, _) => {}
        }
    }

    /// Feed temperature / voltage readings into the feed-forward trim.
    pub fn set_environment(&mut self, temperature_c: f64, voltage_mv: f64) {
        self.clock.apply_environment(&self.cfg, temperature_c, voltage_mv);
        debug!(
            temperature_c,
            voltage_mv,
            trim_ppb = self.clock.environment_trim_ppb(),
            "environment compensation updated"
        );
    }

    /// Simulation hook: physical oscillator error of the local crystal.
    pub fn set_oscillator_error_ppb(&mut self, error: i64) {
        self.clock.set_oscillator_error_ppb(error);
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    /// Advance one tick, optionally handling one inbound message.
    ///
    /// At most one state transition happens per tick: a transition caused by
    /// the message suppresses the timeout checks for this tick.
    pub fn tick(&mut self, inbound: Option<SyncMessage>) -> NetworkTime {
        self.clock.advance(self.nominal_tick_ns);
        self.ticks_since_announce = self.ticks_since_announce.saturating_add(1);
        self.ticks_since_sync = self.ticks_since_sync.saturating_add(1);
        self.ticks_since_beacon = self.ticks_since_beacon.saturating_add(1);

        let before = self.stats.state_changes;
        if let Some(msg) = inbound {
            self.handle_message(msg);
        }
        if self.stats.state_changes == before {
            self.check_timeouts();
        }

        self.publish();
        if self.state == SyncState::Master
            && self.ticks_since_beacon >= self.cfg.beacon_interval_ticks
        {
            self.emit_beacon();
        }
        self.network_time()
    }

    fn handle_message(&mut self, msg: SyncMessage) {
        if msg.domain() != self.cfg.domain || msg.source() == self.cfg.clock_identity {
            self.stats.messages_ignored += 1;
            return;
        }

        match (self.state, msg) {
            (SyncState::Init | SyncState::Passive, _) => {
                self.stats.messages_ignored += 1;
            }

            // ── Announce ──────────────────────────────────────────────────────
            (SyncState::Listening | SyncState::Master, SyncMessage::Announce { source, .. }) => {
                if source < self.cfg.clock_identity {
                    self.stats.announces_accepted += 1;
                    self.select_master(source);
                } else {
                    // We are the better clock; they will defer to us.
                    self.stats.messages_ignored += 1;
                }
            }
            (SyncState::Uncalibrated | SyncState::Slave, SyncMessage::Announce { source, .. }) => {
                let current = self.best_master.unwrap_or(self.cfg.clock_identity);
                if source == current {
                    self.stats.announces_accepted += 1;
                    self.ticks_since_announce = 0;
                } else if source < current {
                    self.stats.announces_accepted += 1;
                    self.select_master(source);
                } else {
                    self.stats.messages_ignored += 1;
                }
            }

            // ── Sync ──────────────────────────────────────────────────────────
            (SyncState::Uncalibrated, SyncMessage::Sync { source, timestamp_ns, .. })
                if Some(source) == self.best_master =>
            {
                self.stats.syncs_accepted += 1;
                self.ticks_since_sync = 0;
                self.offset_ns =
                    signed_ns(timestamp_ns).saturating_sub(signed_ns(self.clock.now_ns()));
                info!(master = %source, offset_ns = self.offset_ns, "initial offset acquired");
                self.transition(SyncState::Slave, "first sync from selected master");
            }
            (SyncState::Slave, SyncMessage::Sync { source, timestamp_ns, .. })
                if Some(source) == self.best_master =>
            {
                self.stats.syncs_accepted += 1;
                self.ticks_since_sync = 0;
                self.correct(timestamp_ns);
            }
            (_, SyncMessage::Sync { .. }) => {
                self.stats.messages_ignored += 1;
            }
        }
    }

    fn select_master(&mut self, source: ClockIdentity) {
        self.best_master = Some(source);
        self.ticks_since_announce = 0;
        self.ticks_since_sync = 0;
        if self.state != SyncState::Uncalibrated {
            self.transition(SyncState::Uncalibrated, "better master announced");
        } else {
            debug!(master = %source, "candidate master replaced");
        }
    }

    /// Step the offset onto the master and nudge the frequency trim.
    fn correct(&mut self, remote_ns: u64) {
        let estimate = signed_ns(self.clock.now_ns()).saturating_add(self.offset_ns);
        let residual = signed_ns(remote_ns).saturating_sub(estimate);
        self.offset_ns = self.offset_ns.saturating_add(residual);
        self.stats.last_residual_ns = residual;

        let mut trim = self.clock.sync_trim_ppb();
        if residual > self.cfg.offset_threshold_ns {
            trim += self.cfg.trim_step_ppb;
        } else if residual < -self.cfg.offset_threshold_ns {
            trim -= self.cfg.trim_step_ppb;
        }
        let trim = trim.clamp(-self.cfg.max_trim_ppb, self.cfg.max_trim_ppb);
        self.clock.set_sync_trim_ppb(trim);

        debug!(residual_ns = residual, trim_ppb = trim, "sync correction");
    }

    fn check_timeouts(&mut self) {
        match self.state {
            SyncState::Init => {
                if self.cfg.force_master {
                    self.become_master("forced master");
                } else if self.cfg.sync_enable {
                    self.transition(SyncState::Listening, "sync enabled");
                }
            }
            SyncState::Listening => {
                if self.ticks_since_announce >= self.cfg.announce_timeout_ticks {
                    self.become_master("no announce within timeout");
                }
            }
            SyncState::Uncalibrated | SyncState::Slave => {
                if self.ticks_since_sync >= self.cfg.sync_timeout_ticks {
                    self.stats.sync_losses += 1;
                    warn!(
                        master = ?self.best_master.map(|m| m.to_string()),
                        ticks = self.ticks_since_sync,
                        "sync lost, falling back to free-running time"
                    );
                    self.best_master = None;
                    self.transition(SyncState::Listening, "sync timeout");
                }
            }
            SyncState::Master | SyncState::Passive => {}
        }
    }

    fn become_master(&mut self, reason: &'static str) {
        // Fold the current estimate into the local counter so offset 0 keeps
        // time continuous.
        self.clock.set_now(self.published_ns.max(self.estimate_ns()));
        self.offset_ns = 0;
        self.best_master = None;
        self.transition(SyncState::Master, reason);
        self.emit_beacon();
    }

    fn emit_beacon(&mut self) {
        self.ticks_since_beacon = 0;
        let source = self.cfg.clock_identity;
        let domain = self.cfg.domain;
        self.outbound.push_back(SyncMessage::Announce { source, domain });
        self.outbound.push_back(SyncMessage::Sync {
            source,
            domain,
            timestamp_ns: self.published_ns.max(self.estimate_ns()),
        });
        self.stats.beacons_sent += 1;
    }

    fn transition(&mut self, next: SyncState, reason: &'static str) {
        if next == self.state {
            return;
        }
        info!(from = ?self.state, to = ?next, reason, "sync state change");
        self.state = next;
        self.stats.state_changes += 1;
        self.ticks_since_announce = 0;
        self.ticks_since_sync = 0;
    }

    fn estimate_ns(&self) -> u64 {
        let estimate = signed_ns(self.clock.now_ns()).saturating_add(self.offset_ns);
        u64::try_from(estimate).unwrap_or(0)
    }

    fn publish(&mut self) {
        self.published_ns = self.published_ns.max(self.estimate_ns());
    }
}

/// Nanosecond counter as a signed value, saturating past `i64::MAX`.
fn signed_ns(ns: u64) -> i64 {
    i64::try_from(ns).unwrap_or(i64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
