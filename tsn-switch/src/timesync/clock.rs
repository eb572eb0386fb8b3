/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Free-running local clock with frequency trim.
//!
//! The clock advances by the nominal tick scaled by
//! `1 + (oscillator_error + sync_trim + environment_trim) / 10⁹`.
//! Sub-nanosecond remainders are carried between ticks, so a trim of a few
//! ppb is not lost to rounding.
//!
//! * `oscillator_error` models the physical crystal (fixed at build time in
//!   hardware, injectable here for simulation).
//! * `sync_trim` is the closed-loop correction driven by sync messages.
//! * `environment_trim` is the open-loop feed-forward term computed from
//!   temperature and voltage readings.

use crate::config::TimeSyncConfig;

const PPB: i128 = 1_000_000_000;

/// Lowest accepted total rate deviation; keeps the clock moving forward.
const MIN_TOTAL_PPB: i64 = -500_000_000;

#[derive(Debug, Clone, Default)]
pub struct LocalClock {
    now_ns: u64,
    /// Carried remainder in `ns × 10⁹` units.
    fraction: i128,
    oscillator_error_ppb: i64,
    sync_trim_ppb: i64,
    environment_trim_ppb: i64,
}

impl LocalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    /// Jump the counter (used when becoming master to keep time continuous).
    pub fn set_now(&mut self, now_ns: u64) {
        self.now_ns = now_ns;
        self.fraction = 0;
    }

    pub fn sync_trim_ppb(&self) -> i64 {
        self.sync_trim_ppb
    }

    pub fn set_sync_trim_ppb(&mut self, trim: i64) {
        self.sync_trim_ppb = trim;
    }

    pub fn environment_trim_ppb(&self) -> i64 {
        self.environment_trim_ppb
    }

    pub fn set_oscillator_error_ppb(&mut self, error: i64) {
        self.oscillator_error_ppb = error;
    }

    /// Recompute the feed-forward term from sensor readings.
    ///
    /// The crystal drifts by `coefficient × (reading − reference)`; the trim
    /// is the negation of that drift.
    pub fn apply_environment(
        &mut self,
        cfg: &TimeSyncConfig,
        temperature_c: f64,
        voltage_mv: f64,
    ) {
        let thermal = cfg.temperature_coefficient_ppb_per_c
            * (temperature_c - cfg.reference_temperature_c);
        let supply =
            cfg.voltage_coefficient_ppb_per_mv * (voltage_mv - cfg.reference_voltage_mv);
        let drift = thermal + supply;
        self.environment_trim_ppb = -drift.round() as i64;
    }

    /// Effective rate deviation in ppb.
    pub fn total_ppb(&self) -> i64 {
        let total = self.oscillator_error_ppb + self.sync_trim_ppb + self.environment_trim_ppb;
        total.max(MIN_TOTAL_PPB)
    }

    /// Advance by one nominal interval and return the new counter.
    pub fn advance(&mut self, nominal_ns: u64) -> u64 {
        let scaled = nominal_ns as i128 * (PPB + self.total_ppb() as i128) + self.fraction;
        let whole = scaled.div_euclid(PPB);
        self.fraction = scaled.rem_euclid(PPB);
        self.now_ns = self.now_ns.saturating_add(whole.max(0) as u64);
        self.now_ns
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
