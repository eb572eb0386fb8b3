/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Credit-based shaper state for one `(port, class)` pair.
//!
//! Credit is kept in scaled units of `bits × 10⁹` so that
//! `slope (bit/s) × Δt (ns)` adds without rounding.  [`CreditState::credit_bits`]
//! converts back for reporting.

use serde::Deserialize;

/// One bit in accumulator units.
const SCALE: i128 = 1_000_000_000;

/// Shaper parameters for a stream-reservation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CreditParams {
    /// Credit gained per second while not transmitting (bit/s, > 0).
    pub idle_slope_bps: u64,
    /// Credit change per second while transmitting (bit/s, < 0).
    pub send_slope_bps: i64,
    /// Upper credit bound in bits (>= 0).
    pub hi_limit_bits: i64,
    /// Lower credit bound in bits (<= 0).
    pub lo_limit_bits: i64,
}

impl CreditParams {
    /// Idle slope = 25 % of the line rate, send slope = idle − line rate,
    /// limits = ± one maximum-size frame (1522 bytes).
    pub fn default_for_line_rate(line_rate_bps: u64) -> Self {
        let idle = line_rate_bps / 4;
        let max_frame_bits = 1522 * 8;
        Self {
            idle_slope_bps: idle,
            send_slope_bps: idle as i64 - line_rate_bps as i64,
            hi_limit_bits: max_frame_bits,
            lo_limit_bits: -max_frame_bits,
        }
    }
}

/// Accumulator plus the parameters it is updated with.
///
/// The accumulator is clamped to `[lo_limit, hi_limit]` after every update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditState {
    params: CreditParams,
    accumulator: i128,
}

impl CreditState {
    pub fn new(params: CreditParams) -> Self {
        Self {
            params,
            accumulator: 0,
        }
    }

    pub fn params(&self) -> &CreditParams {
        &self.params
    }

    /// Credit in whole bits, truncated toward zero.
    pub fn credit_bits(&self) -> i64 {
        (self.accumulator / SCALE) as i64
    }

    /// Raw accumulator in `bits × 10⁹` units.
    pub fn accumulator(&self) -> i128 {
        self.accumulator
    }

    /// Credit gate: open iff the accumulator is non-negative.
    pub fn is_open(&self) -> bool {
        self.accumulator >= 0
    }

    /// The class was idle (not transmitting) for `dt_ns`.
    pub fn accrue_idle(&mut self, dt_ns: u64) {
        self.accumulator += self.params.idle_slope_bps as i128 * dt_ns as i128;
        self.clamp();
    }

    /// The class was transmitting for `dt_ns`.
    pub fn spend_transmitting(&mut self, dt_ns: u64) {
        self.accumulator -= (self.params.send_slope_bps as i128).abs() * dt_ns as i128;
        self.clamp();
    }

    fn clamp(&mut self) {
        let hi = self.params.hi_limit_bits as i128 * SCALE;
        let lo = self.params.lo_limit_bits as i128 * SCALE;
        self.accumulator = self.accumulator.clamp(lo, hi);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn params(idle: u64, send: i64, hi: i64, lo: i64) -> CreditParams {
        CreditParams {
            idle_slope_bps: idle,
            send_slope_bps: send,
            hi_limit_bits: hi,
            lo_limit_bits: lo,
        }
    }

    #[test]
    fn one_ms_idle_at_125_mbps_yields_125_000_bits() {
        let mut c = CreditState::new(params(125_000_000, -875_000_000, 1_000_000, -1_000_000));
        c.accrue_idle(1_000_000);
        assert_eq!(c.credit_bits(), 125_000);
        assert!(c.is_open());
    }

    #[test]
    fn idle_credit_is_clamped_to_hi_limit() {
        let mut c = CreditState::new(params(125_000_000, -875_000_000, 100_000, -100_000));
        c.accrue_idle(1_000_000);
        assert_eq!(c.credit_bits(), 100_000);
    }

    #[test]
    fn transmitting_spends_at_send_slope_and_clamps_low() {
        let mut c = CreditState::new(params(125_000_000, -875_000_000, 10_000, -5_000));
        // 4096ns at 875 Mbit/s ≈ 3584 bits
        c.spend_transmitting(4_096);
        assert_eq!(c.credit_bits(), -3_584);
        assert!(!c.is_open());
        c.spend_transmitting(1_000_000);
        assert_eq!(c.credit_bits(), -5_000);
    }

    #[test]
    fn credit_stays_bounded_under_any_update_sequence() {
        let p = params(250_000_000, -750_000_000, 12_176, -12_176);
        let mut c = CreditState::new(p);
        // Deterministic pseudo-random walk over idle / transmit steps
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for _ in 0..10_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let dt = seed % 50_000;
            if seed & 1 == 0 {
                c.accrue_idle(dt);
            } else {
                c.spend_transmitting(dt);
            }
            assert!(c.credit_bits() <= p.hi_limit_bits);
            assert!(c.credit_bits() >= p.lo_limit_bits);
        }
    }

    #[test]
    fn default_params_follow_line_rate() {
        let p = CreditParams::default_for_line_rate(1_000_000_000);
        assert_eq!(p.idle_slope_bps, 250_000_000);
        assert_eq!(p.send_slope_bps, -750_000_000);
        assert_eq!(p.hi_limit_bits, 12_176);
    }
}
