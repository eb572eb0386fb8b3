/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! TSN switch control plane
//!
//! A shared network time base gates per-class transmission eligibility,
//! which in turn decides which queued frame wins a contended output port.
//!
//! ```text
//! lib.rs
//! ├── frame/        – descriptors, MAC addresses, port sets, grants
//! ├── config/       – YAML switch configuration + load-time validation
//! ├── timesync/     – best-master election, offset / trim correction
//! ├── gate/         – gate control list, credit-based shaper, eligibility
//! ├── forwarding/   – learning, VLAN / security policy, egress arbitration
//! ├── switch        – tick-ordered composition of the three engines
//! └── runtime       – tokio task driving a switch over ordered channels
//! ```

pub mod config;
pub mod forwarding;
pub mod frame;
pub mod gate;
pub mod runtime;
pub mod switch;
pub mod timesync;

pub use config::{ConfigError, SwitchConfig, SwitchConfigManager};
pub use switch::{Switch, SwitchStatistics};
