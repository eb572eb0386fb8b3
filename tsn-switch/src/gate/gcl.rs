/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Gate control list and cycle position tracking.
//!
//! The gate mask at any instant is a pure function of
//! `(now − base_time) mod cycle_time`; [`GateControlList::position_at`] is
//! that function.  [`CycleTracker`] walks the same schedule incrementally so
//! it can count gate-open transitions between two observations.

use crate::config::ConfigError;
use crate::frame::{TrafficClass, NUM_CLASSES};

/// Longest gate control list accepted.  The list length itself is the
/// authoritative wrap point; this only bounds it.
pub const MAX_GCL_ENTRIES: usize = 256;

/// Default cycle when no schedule is configured: 1 ms.
pub const DEFAULT_CYCLE_TIME_NS: u64 = 1_000_000;

/// Number of entries in the default schedule.
const DEFAULT_ENTRY_COUNT: u64 = 8;

// ── Gate mask ─────────────────────────────────────────────────────────────────

/// Eight-bit gate state, bit N = class N open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct GateMask(pub u8);

impl GateMask {
    pub const ALL_OPEN: GateMask = GateMask(0xFF);

    pub fn is_open(self, class: TrafficClass) -> bool {
        (self.0 >> class.get()) & 1 == 1
    }

    /// Classes open in `self` that were closed in `previous`.
    pub fn opened_since(self, previous: GateMask) -> GateMask {
        GateMask(self.0 & !previous.0)
    }

    pub fn classes(self) -> impl Iterator<Item = TrafficClass> {
        (0..NUM_CLASSES as u8)
            .filter_map(TrafficClass::new)
            .filter(move |&c| self.is_open(c))
    }
}

/// One `(gate mask, duration)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateEntry {
    pub gate_mask: GateMask,
    pub duration_ns: u64,
}

/// Where in the cycle a given instant falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePosition {
    pub index: usize,
    /// Time already spent inside the current entry.
    pub offset_in_entry_ns: u64,
    /// Time left until the current entry ends.
    pub remaining_ns: u64,
    pub mask: GateMask,
}

// ── Gate control list ─────────────────────────────────────────────────────────

/// Validated, immutable gate control list.
///
/// Construction guarantees: at least one entry, at most
/// [`MAX_GCL_ENTRIES`], every duration non-zero, durations summing exactly
/// to `cycle_time_ns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateControlList {
    entries: Vec<GateEntry>,
    /// `starts[i]` = offset of entry `i` from the cycle start.
    starts: Vec<u64>,
    cycle_time_ns: u64,
    /// Gate-open transitions per class over one full cycle (wrap included).
    opens_per_cycle: [u64; NUM_CLASSES],
}

impl GateControlList {
    /// # Errors
    /// Any violated construction invariant; see [`ConfigError`].
    pub fn new(entries: Vec<GateEntry>, cycle_time_ns: u64) -> Result<Self, ConfigError> {
        if cycle_time_ns == 0 {
            return Err(ConfigError::ZeroCycleTime);
        }
        if entries.is_empty() {
            return Err(ConfigError::EmptyGateControlList);
        }
        if entries.len() > MAX_GCL_ENTRIES {
            return Err(ConfigError::TooManyGateEntries {
                count: entries.len(),
                max: MAX_GCL_ENTRIES,
            });
        }
        if let Some(index) = entries.iter().position(|e| e.duration_ns == 0) {
            return Err(ConfigError::ZeroEntryDuration { index });
        }

        let sum_ns: u128 = entries.iter().map(|e| e.duration_ns as u128).sum();
        if sum_ns != cycle_time_ns as u128 {
            return Err(ConfigError::CycleTimeMismatch {
                sum_ns,
                cycle_time_ns,
            });
        }

        Ok(Self::assemble(entries, cycle_time_ns))
    }

    /// Eight equal-duration entries, all gates open, 1 ms cycle.
    pub fn default_schedule() -> Self {
        let entries = (0..DEFAULT_ENTRY_COUNT)
            .map(|_| GateEntry {
                gate_mask: GateMask::ALL_OPEN,
                duration_ns: DEFAULT_CYCLE_TIME_NS / DEFAULT_ENTRY_COUNT,
            })
            .collect();
        Self::assemble(entries, DEFAULT_CYCLE_TIME_NS)
    }

    /// Precompute entry start offsets and per-cycle open transitions.
    /// Callers have already established the construction invariants.
    fn assemble(entries: Vec<GateEntry>, cycle_time_ns: u64) -> Self {
        let mut starts = Vec::with_capacity(entries.len());
        let mut acc = 0u64;
        for e in &entries {
            starts.push(acc);
            acc += e.duration_ns;
        }

        let mut opens_per_cycle = [0u64; NUM_CLASSES];
        for (i, e) in entries.iter().enumerate() {
            let prev = entries[(i + entries.len() - 1) % entries.len()].gate_mask;
            for class in e.gate_mask.opened_since(prev).classes() {
                opens_per_cycle[class.index()] += 1;
            }
        }

        Self {
            entries,
            starts,
            cycle_time_ns,
            opens_per_cycle,
        }
    }

    pub fn entries(&self) -> &[GateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cycle_time_ns(&self) -> u64 {
        self.cycle_time_ns
    }

    pub fn opens_per_cycle(&self) -> &[u64; NUM_CLASSES] {
        &self.opens_per_cycle
    }

    /// Elapsed time inside the cycle for `now`, using Euclidean remainder so
    /// instants before `base_time` are also periodic.
    pub fn cycle_offset(&self, now_ns: u64, base_time_ns: u64) -> u64 {
        let diff = now_ns as i128 - base_time_ns as i128;
        diff.rem_euclid(self.cycle_time_ns as i128) as u64
    }

    /// Entry index, offset and gate mask at `now`.
    pub fn position_at(&self, now_ns: u64, base_time_ns: u64) -> CyclePosition {
        let elapsed = self.cycle_offset(now_ns, base_time_ns);
        // Last entry whose start is <= elapsed.
        let index = self.starts.partition_point(|&s| s <= elapsed) - 1;
        let offset = elapsed - self.starts[index];
        let entry = self.entries[index];
        CyclePosition {
            index,
            offset_in_entry_ns: offset,
            remaining_ns: entry.duration_ns - offset,
            mask: entry.gate_mask,
        }
    }

    pub fn mask_at(&self, now_ns: u64, base_time_ns: u64) -> GateMask {
        self.position_at(now_ns, base_time_ns).mask
    }
}

// ── Cycle tracker ─────────────────────────────────────────────────────────────

/// Incremental walk over the gate control list.
///
/// Holds the current entry index and the timer inside that entry.  Each
/// [`advance`](Self::advance) moves forward by the elapsed delta, crossing
/// entry boundaries (wrapping past the last entry to index 0) and reporting
/// every class whose gate went from closed to open on the way.  Whole
/// cycles inside one delta are fast-forwarded using the list's per-cycle
/// transition counts, so the result equals a per-nanosecond walk.
#[derive(Debug, Clone, Default)]
pub struct CycleTracker {
    index: usize,
    timer_ns: u64,
    /// Absolute `now − base` at the last advance; `None` before the first.
    last_elapsed: Option<i128>,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timer_ns(&self) -> u64 {
        self.timer_ns
    }

    pub fn mask(&self, gcl: &GateControlList) -> GateMask {
        gcl.entries()[self.index].gate_mask
    }

    /// Time left in the current entry.
    pub fn remaining_ns(&self, gcl: &GateControlList) -> u64 {
        gcl.entries()[self.index].duration_ns - self.timer_ns
    }

    /// Move to `now` and return how many times each class's gate opened.
    ///
    /// The first call only positions the tracker.  A backwards step (which
    /// network time never produces) re-positions without counting.  Callers
    /// that know a step was discontinuous use [`reposition`](Self::reposition)
    /// instead.
    pub fn advance(
        &mut self,
        gcl: &GateControlList,
        now_ns: u64,
        base_time_ns: u64,
    ) -> [u64; NUM_CLASSES] {
        let mut opened = [0u64; NUM_CLASSES];
        let elapsed = now_ns as i128 - base_time_ns as i128;

        let delta = match self.last_elapsed {
            Some(last) if elapsed >= last => (elapsed - last) as u128,
            _ => {
                self.reposition(gcl, now_ns, base_time_ns);
                return opened;
            }
        };
        self.last_elapsed = Some(elapsed);

        let cycle = gcl.cycle_time_ns() as u128;
        let full_cycles = delta / cycle;
        if full_cycles > 0 {
            for (count, per_cycle) in opened.iter_mut().zip(gcl.opens_per_cycle()) {
                *count = count.saturating_add((full_cycles as u64).saturating_mul(*per_cycle));
            }
        }

        let mut remaining = (delta % cycle) as u64;
        let entries = gcl.entries();
        loop {
            let left_in_entry = entries[self.index].duration_ns - self.timer_ns;
            if remaining < left_in_entry {
                self.timer_ns += remaining;
                break;
            }
            remaining -= left_in_entry;
            let previous = entries[self.index].gate_mask;
            self.index = (self.index + 1) % entries.len();
            self.timer_ns = 0;
            for class in entries[self.index].gate_mask.opened_since(previous).classes() {
                opened[class.index()] += 1;
            }
        }
        opened
    }

    /// Jump to the position of `now` without counting any openings.
    pub fn reposition(&mut self, gcl: &GateControlList, now_ns: u64, base_time_ns: u64) {
        let pos = gcl.position_at(now_ns, base_time_ns);
        self.index = pos.index;
        self.timer_ns = pos.offset_in_entry_ns;
        self.last_elapsed = Some(now_ns as i128 - base_time_ns as i128);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
