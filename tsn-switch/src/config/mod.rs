/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Switch configuration loading and validation.
//!
//! A flat register file becomes a structured [`SwitchConfig`] with named
//! fields; every load-time invariant (GCL duration sum, port and VLAN ranges,
//! credit limits) is checked before the configuration can reach an engine.
//!
//! The expected YAML structure is (every key optional):
//! ```yaml
//! switch:
//!   port_count: 4
//!   line_rate_bps: 1000000000
//!   tick_ns: 1000
//!   enabled_ports: [0, 1, 2, 3]
//! schedule:
//!   cycle_time_ns: 1000000
//!   base_time_ns: 0
//!   guard_band_ns: 500
//!   sr_class_a: 3
//!   sr_class_b: 2
//!   sync_loss_policy: fail_open
//!   gate_control_list:
//!     - { gate_mask: 255, duration_ns: 600000 }
//!     - { gate_mask: 8, duration_ns: 400000 }
//!   credit:
//!     - { class: 3, idle_slope_bps: 125000000, send_slope_bps: -875000000,
//!         hi_limit_bits: 12176, lo_limit_bits: -12176 }
//! forwarding:
//!   learning_enable: true
//!   security_enable: false
//!   allowed_mac_base: "02:00:00:00:00:00"
//!   allowed_mac_mask: "FF:00:00:00:00:00"
//!   blocked_ether_types: [34958]
//!   cut_through_enable: true
//!   cut_through_threshold_bytes: 64
//!   table_capacity: 1024
//!   aging_time_ns: 300000000000
//!   ingress_queue_depth: 16
//!   vlans:
//!     - { id: 10, members: [0, 1, 2], untagged: [0] }
//! time_sync:
//!   clock_identity: 42
//!   domain: 0
//!   sync_enable: true
//!   force_master: false
//! ```

pub mod error;

pub use error::ConfigError;

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::frame::{MacAddress, PortId, PortSet, TrafficClass, VlanId, MAX_PORTS, NUM_CLASSES};
use crate::gate::credit::CreditParams;
use crate::gate::gcl::{GateControlList, GateEntry, GateMask};
use crate::timesync::message::ClockIdentity;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of the VLAN membership / untag tables.
pub const VLAN_TABLE_SIZE: usize = 256;

const DEFAULT_PORT_COUNT: usize = 4;
const DEFAULT_LINE_RATE_BPS: u64 = 1_000_000_000;
const DEFAULT_TICK_NS: u64 = 1_000;

// ── Public data structures ────────────────────────────────────────────────────

/// What the gate scheduler does while network time is not synchronised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLossPolicy {
    /// Keep gating on free-running time.
    #[default]
    FailOpen,
    /// Deny every frame until time is valid again.
    FailClosed,
}

/// Gate and credit scheduling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub gcl: GateControlList,
    pub base_time_ns: u64,
    pub guard_band_ns: u64,
    pub sr_class_a: TrafficClass,
    pub sr_class_b: TrafficClass,
    /// Shaper parameters, indexed by class.  Only the two stream-reservation
    /// classes may carry `Some`.
    pub credit: [Option<CreditParams>; NUM_CLASSES],
    pub sync_loss_policy: SyncLossPolicy,
}

/// Learning, policy and relay parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingConfig {
    pub learning_enable: bool,
    pub security_enable: bool,
    pub allowed_mac_base: MacAddress,
    pub allowed_mac_mask: MacAddress,
    pub blocked_ether_types: BTreeSet<u16>,
    pub cut_through_enable: bool,
    pub cut_through_threshold_bytes: u32,
    pub table_capacity: usize,
    /// `0` disables aging.
    pub aging_time_ns: u64,
    pub ingress_queue_depth: usize,
    /// Member ports per VLAN id, [`VLAN_TABLE_SIZE`] entries.
    pub vlan_membership: Vec<PortSet>,
    /// Ports that transmit the VLAN untagged, [`VLAN_TABLE_SIZE`] entries.
    pub vlan_untag: Vec<PortSet>,
}

/// Time synchronisation parameters.  Timeouts and intervals are tick counts.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSyncConfig {
    pub clock_identity: ClockIdentity,
    pub domain: u8,
    pub sync_enable: bool,
    pub force_master: bool,
    pub announce_timeout_ticks: u64,
    pub sync_timeout_ticks: u64,
    pub beacon_interval_ticks: u64,
    /// Residual beyond which the frequency trim is nudged.
    pub offset_threshold_ns: i64,
    pub trim_step_ppb: i64,
    pub max_trim_ppb: i64,
    pub temperature_coefficient_ppb_per_c: f64,
    pub reference_temperature_c: f64,
    pub voltage_coefficient_ppb_per_mv: f64,
    pub reference_voltage_mv: f64,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            clock_identity: ClockIdentity(0x00FF_FE00_0000_0001),
            domain: 0,
            sync_enable: true,
            force_master: false,
            announce_timeout_ticks: 3_000,
            sync_timeout_ticks: 3_000,
            beacon_interval_ticks: 1_000,
            offset_threshold_ns: 100,
            trim_step_ppb: 10,
            max_trim_ppb: 100_000,
            temperature_coefficient_ppb_per_c: 0.0,
            reference_temperature_c: 25.0,
            voltage_coefficient_ppb_per_mv: 0.0,
            reference_voltage_mv: 3_300.0,
        }
    }
}

/// Complete switch configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchConfig {
    pub port_count: usize,
    pub line_rate_bps: u64,
    /// Virtual time advanced per tick.
    pub tick_ns: u64,
    pub port_enable_mask: PortSet,
    pub schedule: ScheduleConfig,
    pub forwarding: ForwardingConfig,
    pub time_sync: TimeSyncConfig,
}

impl Default for SwitchConfig {
    /// Four gigabit ports, the default 1 ms all-open schedule, SR classes 3
    /// and 2 shaped at 25 % of line rate, every VLAN spanning every port.
    fn default() -> Self {
        Self::default_for_ports(DEFAULT_PORT_COUNT)
    }
}

impl SwitchConfig {
    /// Defaults with `port_count` ports.
    pub fn default_for_ports(port_count: usize) -> Self {
        let all = PortSet::all(port_count);
        let sr_a = TrafficClass::from_priority(3);
        let sr_b = TrafficClass::from_priority(2);
        let mut credit = [None; NUM_CLASSES];
        credit[sr_a.index()] = Some(CreditParams::default_for_line_rate(DEFAULT_LINE_RATE_BPS));
        credit[sr_b.index()] = Some(CreditParams::default_for_line_rate(DEFAULT_LINE_RATE_BPS));

        Self {
            port_count,
            line_rate_bps: DEFAULT_LINE_RATE_BPS,
            tick_ns: DEFAULT_TICK_NS,
            port_enable_mask: all,
            schedule: ScheduleConfig {
                gcl: GateControlList::default_schedule(),
                base_time_ns: 0,
                guard_band_ns: 0,
                sr_class_a: sr_a,
                sr_class_b: sr_b,
                credit,
                sync_loss_policy: SyncLossPolicy::FailOpen,
            },
            forwarding: ForwardingConfig {
                learning_enable: true,
                security_enable: false,
                allowed_mac_base: MacAddress::default(),
                allowed_mac_mask: MacAddress::default(),
                blocked_ether_types: BTreeSet::new(),
                cut_through_enable: false,
                cut_through_threshold_bytes: 64,
                table_capacity: 1_024,
                aging_time_ns: 300_000_000_000,
                ingress_queue_depth: 16,
                vlan_membership: vec![all; VLAN_TABLE_SIZE],
                vlan_untag: vec![PortSet::EMPTY; VLAN_TABLE_SIZE],
            },
            time_sync: TimeSyncConfig::default(),
        }
    }

    /// Check every load-time invariant not already enforced by a type.
    ///
    /// # Errors
    /// The first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_count == 0 || self.port_count > MAX_PORTS {
            return Err(ConfigError::InvalidPortCount {
                count: self.port_count,
                max: MAX_PORTS,
            });
        }
        if self.line_rate_bps == 0 {
            return Err(ConfigError::ZeroLineRate);
        }
        if self.tick_ns == 0 {
            return Err(ConfigError::ZeroTick);
        }
        self.check_ports("port_enable_mask", self.port_enable_mask)?;

        // Schedule
        let s = &self.schedule;
        if s.sr_class_a == s.sr_class_b {
            return Err(ConfigError::DuplicateSrClass {
                class: s.sr_class_a.get(),
            });
        }
        for (class, params) in s.credit.iter().enumerate() {
            let Some(p) = params else { continue };
            let class = class as u8;
            if class != s.sr_class_a.get() && class != s.sr_class_b.get() {
                return Err(ConfigError::CreditForUnshapedClass { class });
            }
            if p.idle_slope_bps == 0 || p.send_slope_bps >= 0 {
                return Err(ConfigError::InvalidSlopes {
                    class,
                    idle_slope_bps: p.idle_slope_bps,
                    send_slope_bps: p.send_slope_bps,
                });
            }
            if p.lo_limit_bits > 0 || p.hi_limit_bits < 0 {
                return Err(ConfigError::InvalidCreditLimits {
                    class,
                    lo_limit_bits: p.lo_limit_bits,
                    hi_limit_bits: p.hi_limit_bits,
                });
            }
        }

        // Forwarding
        let f = &self.forwarding;
        if f.cut_through_enable && f.cut_through_threshold_bytes == 0 {
            return Err(ConfigError::ZeroCutThroughThreshold);
        }
        if f.table_capacity == 0 {
            return Err(ConfigError::ZeroTableCapacity);
        }
        if f.ingress_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        for members in f.vlan_membership.iter().chain(&f.vlan_untag) {
            self.check_ports("vlan", *members)?;
        }

        // Time sync
        let t = &self.time_sync;
        for (field, value) in [
            ("announce_timeout_ticks", t.announce_timeout_ticks),
            ("sync_timeout_ticks", t.sync_timeout_ticks),
            ("beacon_interval_ticks", t.beacon_interval_ticks),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroSyncInterval { field });
            }
        }

        Ok(())
    }

    /// VLAN membership for `vlan`; ids outside the table have no members.
    pub fn vlan_members(&self, vlan: VlanId) -> PortSet {
        self.forwarding
            .vlan_membership
            .get(vlan as usize)
            .copied()
            .unwrap_or(PortSet::EMPTY)
    }

    /// Shaper parameters for `class`, if it is shaped.
    pub fn credit_params(&self, class: TrafficClass) -> Option<CreditParams> {
        self.schedule.credit[class.index()]
    }

    fn check_ports(&self, context: &'static str, set: PortSet) -> Result<(), ConfigError> {
        match set.iter().find(|&p| p >= self.port_count) {
            Some(port) => Err(ConfigError::PortOutOfRange {
                context,
                port,
                port_count: self.port_count,
            }),
            None => Ok(()),
        }
    }
}

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// Kept private – callers work with [`SwitchConfig`] /
/// [`SwitchConfigManager`] instead.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SwitchConfigFile {
    switch: SwitchSection,
    schedule: ScheduleSection,
    forwarding: ForwardingSection,
    time_sync: TimeSyncSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SwitchSection {
    port_count: Option<usize>,
    line_rate_bps: Option<u64>,
    tick_ns: Option<u64>,
    enabled_ports: Option<Vec<PortId>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScheduleSection {
    cycle_time_ns: Option<u64>,
    base_time_ns: Option<u64>,
    guard_band_ns: Option<u64>,
    sr_class_a: Option<u8>,
    sr_class_b: Option<u8>,
    sync_loss_policy: Option<SyncLossPolicy>,
    gate_control_list: Option<Vec<GateEntryEntry>>,
    credit: Vec<CreditEntry>,
}

#[derive(Debug, Deserialize)]
struct GateEntryEntry {
    gate_mask: u8,
    duration_ns: u64,
}

#[derive(Debug, Deserialize)]
struct CreditEntry {
    class: u8,
    #[serde(flatten)]
    params: CreditParams,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForwardingSection {
    learning_enable: Option<bool>,
    security_enable: Option<bool>,
    allowed_mac_base: Option<MacAddress>,
    allowed_mac_mask: Option<MacAddress>,
    blocked_ether_types: Vec<u16>,
    cut_through_enable: Option<bool>,
    cut_through_threshold_bytes: Option<u32>,
    table_capacity: Option<usize>,
    aging_time_ns: Option<u64>,
    ingress_queue_depth: Option<usize>,
    /// Absent → every VLAN spans every port.  Present → only listed VLANs
    /// have members.
    vlans: Option<Vec<VlanEntry>>,
}

#[derive(Debug, Deserialize)]
struct VlanEntry {
    id: u16,
    #[serde(default)]
    members: Vec<PortId>,
    #[serde(default)]
    untagged: Vec<PortId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimeSyncSection {
    clock_identity: Option<u64>,
    domain: Option<u8>,
    sync_enable: Option<bool>,
    force_master: Option<bool>,
    announce_timeout_ticks: Option<u64>,
    sync_timeout_ticks: Option<u64>,
    beacon_interval_ticks: Option<u64>,
    offset_threshold_ns: Option<i64>,
    trim_step_ppb: Option<i64>,
    max_trim_ppb: Option<i64>,
    temperature_coefficient_ppb_per_c: Option<f64>,
    reference_temperature_c: Option<f64>,
    voltage_coefficient_ppb_per_mv: Option<f64>,
    reference_voltage_mv: Option<f64>,
}

fn port_set(
    context: &'static str,
    ports: &[PortId],
    port_count: usize,
) -> Result<PortSet, ConfigError> {
    if let Some(&port) = ports.iter().find(|&&p| p >= port_count) {
        return Err(ConfigError::PortOutOfRange {
            context,
            port,
            port_count,
        });
    }
    Ok(ports.iter().copied().collect())
}

fn class(value: u8) -> Result<TrafficClass, ConfigError> {
    TrafficClass::new(value).ok_or(ConfigError::InvalidClass { class: value })
}

impl SwitchConfigFile {
    /// Overlay the file onto the defaults and validate the result.
    fn into_config(self) -> Result<SwitchConfig, ConfigError> {
        let port_count = self.switch.port_count.unwrap_or(DEFAULT_PORT_COUNT);
        if port_count == 0 || port_count > MAX_PORTS {
            return Err(ConfigError::InvalidPortCount {
                count: port_count,
                max: MAX_PORTS,
            });
        }
        let mut cfg = SwitchConfig::default_for_ports(port_count);

        // ── switch ────────────────────────────────────────────────────────────
        let sw = self.switch;
        if let Some(v) = sw.line_rate_bps {
            cfg.line_rate_bps = v;
        }
        if let Some(v) = sw.tick_ns {
            cfg.tick_ns = v;
        }
        if let Some(ports) = sw.enabled_ports {
            cfg.port_enable_mask = port_set("enabled_ports", &ports, port_count)?;
        }

        // ── schedule ──────────────────────────────────────────────────────────
        let sc = self.schedule;
        cfg.schedule.gcl = match (sc.gate_control_list, sc.cycle_time_ns) {
            (Some(entries), cycle) => {
                let entries: Vec<GateEntry> = entries
                    .into_iter()
                    .map(|e| GateEntry {
                        gate_mask: GateMask(e.gate_mask),
                        duration_ns: e.duration_ns,
                    })
                    .collect();
                // Without an explicit cycle, the list defines it.
                let cycle = cycle.unwrap_or_else(|| {
                    entries.iter().fold(0u64, |acc, e| acc.saturating_add(e.duration_ns))
                });
                GateControlList::new(entries, cycle)?
            }
            (None, Some(cycle)) => GateControlList::new(
                vec![GateEntry {
                    gate_mask: GateMask::ALL_OPEN,
                    duration_ns: cycle,
                }],
                cycle,
            )?,
            (None, None) => GateControlList::default_schedule(),
        };
        if let Some(v) = sc.base_time_ns {
            cfg.schedule.base_time_ns = v;
        }
        if let Some(v) = sc.guard_band_ns {
            cfg.schedule.guard_band_ns = v;
        }
        if let Some(v) = sc.sync_loss_policy {
            cfg.schedule.sync_loss_policy = v;
        }

        let sr_a = sc.sr_class_a.map(class).transpose()?.unwrap_or(cfg.schedule.sr_class_a);
        let sr_b = sc.sr_class_b.map(class).transpose()?.unwrap_or(cfg.schedule.sr_class_b);
        cfg.schedule.sr_class_a = sr_a;
        cfg.schedule.sr_class_b = sr_b;

        // Default shaping follows the (possibly re-mapped) SR classes and the
        // configured line rate; explicit entries override per class.
        let mut credit = [None; NUM_CLASSES];
        credit[sr_a.index()] = Some(CreditParams::default_for_line_rate(cfg.line_rate_bps));
        credit[sr_b.index()] = Some(CreditParams::default_for_line_rate(cfg.line_rate_bps));
        for entry in sc.credit {
            credit[class(entry.class)?.index()] = Some(entry.params);
        }
        cfg.schedule.credit = credit;

        // ── forwarding ────────────────────────────────────────────────────────
        let fw = self.forwarding;
        let f = &mut cfg.forwarding;
        if let Some(v) = fw.learning_enable {
            f.learning_enable = v;
        }
        if let Some(v) = fw.security_enable {
            f.security_enable = v;
        }
        if let Some(v) = fw.allowed_mac_base {
            f.allowed_mac_base = v;
        }
        if let Some(v) = fw.allowed_mac_mask {
            f.allowed_mac_mask = v;
        }
        f.blocked_ether_types = fw.blocked_ether_types.into_iter().collect();
        if let Some(v) = fw.cut_through_enable {
            f.cut_through_enable = v;
        }
        if let Some(v) = fw.cut_through_threshold_bytes {
            f.cut_through_threshold_bytes = v;
        }
        if let Some(v) = fw.table_capacity {
            f.table_capacity = v;
        }
        if let Some(v) = fw.aging_time_ns {
            f.aging_time_ns = v;
        }
        if let Some(v) = fw.ingress_queue_depth {
            f.ingress_queue_depth = v;
        }
        if let Some(vlans) = fw.vlans {
            f.vlan_membership = vec![PortSet::EMPTY; VLAN_TABLE_SIZE];
            f.vlan_untag = vec![PortSet::EMPTY; VLAN_TABLE_SIZE];
            let mut seen = HashSet::new();
            for v in vlans {
                if v.id as usize >= VLAN_TABLE_SIZE {
                    return Err(ConfigError::InvalidVlan { vlan: v.id });
                }
                if !seen.insert(v.id) {
                    return Err(ConfigError::DuplicateVlan { vlan: v.id });
                }
                let id = v.id as usize;
                f.vlan_membership[id] = port_set("vlan members", &v.members, port_count)?;
                f.vlan_untag[id] = port_set("vlan untagged", &v.untagged, port_count)?;
            }
        }

        // ── time_sync ─────────────────────────────────────────────────────────
        let ts = self.time_sync;
        let t = &mut cfg.time_sync;
        if let Some(v) = ts.clock_identity {
            t.clock_identity = ClockIdentity(v);
        }
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $( if let Some(v) = ts.$field { t.$field = v; } )*
            };
        }
        overlay!(
            domain,
            sync_enable,
            force_master,
            announce_timeout_ticks,
            sync_timeout_ticks,
            beacon_interval_ticks,
            offset_threshold_ns,
            trim_step_ppb,
            max_trim_ppb,
            temperature_coefficient_ppb_per_c,
            reference_temperature_c,
            voltage_coefficient_ppb_per_mv,
            reference_voltage_mv,
        );

        cfg.validate()?;
        Ok(cfg)
    }
}

// ── SwitchConfigManager ───────────────────────────────────────────────────────

/// Loads and holds the switch configuration.
///
/// Starts out holding [`SwitchConfig::default`]; a failed load leaves the
/// previous configuration in place.
#[derive(Debug, Default)]
pub struct SwitchConfigManager {
    config: SwitchConfig,

    /// Set to `true` after a successful load.
    loaded: bool,
}

impl SwitchConfigManager {
    /// Creates a manager holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates `path`, replacing the current configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or a [`ConfigError`] invariant is violated.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading switch configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        self.load_from_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    /// Parses and validates YAML text, replacing the current configuration.
    ///
    /// # Errors
    /// Same as [`load_from_file`](Self::load_from_file), minus the I/O.
    pub fn load_from_str(&mut self, content: &str) -> Result<()> {
        let file: SwitchConfigFile = if content.trim().is_empty() {
            SwitchConfigFile::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };

        let config = match file.into_config() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "configuration rejected");
                return Err(e.into());
            }
        };

        debug!(
            ports = config.port_count,
            line_rate_bps = config.line_rate_bps,
            tick_ns = config.tick_ns,
            "  switch"
        );
        debug!(
            cycle_time_ns = config.schedule.gcl.cycle_time_ns(),
            entries = config.schedule.gcl.len(),
            guard_band_ns = config.schedule.guard_band_ns,
            "  schedule"
        );

        info!(
            ports = config.port_count,
            gcl_entries = config.schedule.gcl.len(),
            cycle_time_ns = config.schedule.gcl.cycle_time_ns(),
            clock_identity = %config.time_sync.clock_identity,
            "Successfully loaded switch configuration"
        );

        self.config = config;
        self.loaded = true;
        Ok(())
    }

    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    pub fn into_config(self) -> SwitchConfig {
        self.config
    }

    /// Returns `true` after a successful load.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
