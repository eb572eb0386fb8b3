/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Learned `(MAC, VLAN) → port` bindings.
//!
//! One entry per `(mac, vlan)` key, at most `capacity` entries.  Entries not
//! refreshed for `aging_time_ns` are treated as absent by every lookup and
//! reclaimed lazily: by [`ForwardingTable::age_out`], and on demand when an
//! insertion finds the table full.  An aging time of `0` disables aging.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::frame::{MacAddress, PortId, VlanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForwardingEntry {
    pub mac: MacAddress,
    pub vlan: VlanId,
    pub bound_port: PortId,
    pub last_seen_ns: u64,
}

/// Result of one learning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    /// New entry inserted.
    Learned,
    /// Existing entry refreshed on the same port.
    Refreshed,
    /// Existing entry re-bound to a different port (station move).
    Moved { from: PortId },
    /// No free capacity even after reclaiming aged entries.
    TableFull,
    /// Learning is switched off.
    Disabled,
    /// Source not learnable (group address or rejected by ingress policy).
    Rejected,
}

impl fmt::Display for LearnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearnOutcome::Learned => write!(f, "learned"),
            LearnOutcome::Refreshed => write!(f, "refreshed"),
            LearnOutcome::Moved { from } => write!(f, "moved from port {from}"),
            LearnOutcome::TableFull => write!(f, "table full"),
            LearnOutcome::Disabled => write!(f, "learning disabled"),
            LearnOutcome::Rejected => write!(f, "source rejected"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwardingTable {
    entries: BTreeMap<(MacAddress, VlanId), ForwardingEntry>,
    capacity: usize,
    aging_time_ns: u64,
}

impl ForwardingTable {
    pub fn new(capacity: usize, aging_time_ns: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
            aging_time_ns,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored entries, aged ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_aged(&self, entry: &ForwardingEntry, now_ns: u64) -> bool {
        self.aging_time_ns != 0 && now_ns.saturating_sub(entry.last_seen_ns) >= self.aging_time_ns
    }

    /// Insert or refresh the binding for `(mac, vlan)`.
    pub fn learn(
        &mut self,
        mac: MacAddress,
        vlan: VlanId,
        port: PortId,
        now_ns: u64,
    ) -> LearnOutcome {
        let key = (mac, vlan);
        if let Some(entry) = self.entries.get(&key).copied() {
            let aged = self.is_aged(&entry, now_ns);
            let slot = ForwardingEntry {
                bound_port: port,
                last_seen_ns: now_ns.max(entry.last_seen_ns),
                ..entry
            };
            self.entries.insert(key, slot);
            return match entry.bound_port {
                _ if aged => LearnOutcome::Learned,
                p if p == port => LearnOutcome::Refreshed,
                from => LearnOutcome::Moved { from },
            };
        }

        if self.entries.len() >= self.capacity {
            self.age_out(now_ns);
            if self.entries.len() >= self.capacity {
                return LearnOutcome::TableFull;
            }
        }

        self.entries.insert(
            key,
            ForwardingEntry {
                mac,
                vlan,
                bound_port: port,
                last_seen_ns: now_ns,
            },
        );
        LearnOutcome::Learned
    }

    /// Live binding for `(mac, vlan)` at `now`.
    pub fn lookup(&self, mac: MacAddress, vlan: VlanId, now_ns: u64) -> Option<&ForwardingEntry> {
        self.entries
            .get(&(mac, vlan))
            .filter(|e| !self.is_aged(e, now_ns))
    }

    /// Remove every aged entry; returns how many were removed.
    pub fn age_out(&mut self, now_ns: u64) -> usize {
        if self.aging_time_ns == 0 {
            return 0;
        }
        let before = self.entries.len();
        let aging = self.aging_time_ns;
        self.entries
            .retain(|_, e| now_ns.saturating_sub(e.last_seen_ns) < aging);
        before - self.entries.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
