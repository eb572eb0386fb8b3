/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for switch configuration loading.
//!
//! Every variant names the invariant that was violated and carries the
//! offending values, so a rejected configuration can be logged (or reported
//! back to whoever pushed it) without further parsing.
//!
//! A configuration that fails any of these checks is rejected as a whole;
//! nothing is truncated or partially applied.

use thiserror::Error;

use crate::frame::PortId;

/// Why a configuration was rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The gate control list has no entries.
    #[error("gate control list is empty")]
    EmptyGateControlList,

    /// The gate control list is longer than the hardware list.
    #[error("gate control list has {count} entries (maximum {max})")]
    TooManyGateEntries { count: usize, max: usize },

    /// A gate control list entry has a zero duration.
    #[error("gate control list entry {index} has zero duration")]
    ZeroEntryDuration { index: usize },

    /// Entry durations do not add up to the cycle time.
    #[error("gate control list durations sum to {sum_ns}ns but cycle time is {cycle_time_ns}ns")]
    CycleTimeMismatch { sum_ns: u128, cycle_time_ns: u64 },

    #[error("cycle time must be non-zero")]
    ZeroCycleTime,

    #[error("line rate must be non-zero")]
    ZeroLineRate,

    #[error("tick quantum must be non-zero")]
    ZeroTick,

    /// `port_count` outside `1..=32`.
    #[error("port count {count} is outside 1..={max}")]
    InvalidPortCount { count: usize, max: usize },

    /// A port list refers to a port the switch does not have.
    #[error("{context}: port {port} does not exist (port count {port_count})")]
    PortOutOfRange {
        context: &'static str,
        port: PortId,
        port_count: usize,
    },

    /// VLAN id does not fit the 256-entry membership table.
    #[error("VLAN {vlan} is outside the membership table (0..256)")]
    InvalidVlan { vlan: u16 },

    /// The same VLAN id appears twice.
    #[error("VLAN {vlan} is configured more than once")]
    DuplicateVlan { vlan: u16 },

    /// A traffic class outside `0..8`.
    #[error("traffic class {class} is outside 0..8")]
    InvalidClass { class: u8 },

    /// Both stream-reservation classes map onto the same traffic class.
    #[error("stream-reservation classes A and B must differ (both are {class})")]
    DuplicateSrClass { class: u8 },

    /// Credit parameters supplied for a class that is not stream-reservation.
    #[error("credit parameters given for class {class}, which is not a stream-reservation class")]
    CreditForUnshapedClass { class: u8 },

    /// Credit limits must bracket zero.
    #[error("class {class}: credit limits need lo ({lo_limit_bits}) <= 0 <= hi ({hi_limit_bits})")]
    InvalidCreditLimits {
        class: u8,
        lo_limit_bits: i64,
        hi_limit_bits: i64,
    },

    /// Idle slope must be positive, send slope negative.
    #[error("class {class}: slopes must be idle > 0 ({idle_slope_bps}), send < 0 ({send_slope_bps})")]
    InvalidSlopes {
        class: u8,
        idle_slope_bps: u64,
        send_slope_bps: i64,
    },

    #[error("cut-through threshold must be non-zero when cut-through is enabled")]
    ZeroCutThroughThreshold,

    #[error("forwarding table capacity must be non-zero")]
    ZeroTableCapacity,

    #[error("ingress queue depth must be non-zero")]
    ZeroQueueDepth,

    /// Time-sync timeouts and beacon interval are tick counts and must be
    /// non-zero.
    #[error("time sync: {field} must be non-zero")]
    ZeroSyncInterval { field: &'static str },
}
