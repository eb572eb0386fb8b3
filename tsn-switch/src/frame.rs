/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core frame data structures shared by the three switch engines.
//!
//! ```text
//! decoder ──(FrameDescriptor)──► ForwardingEngine ──► GateScheduler ──(TransmissionGrant)──► tx
//!             ↑ input, immutable                                          ↑ output
//! ```
//!
//! # Ownership model
//! A [`FrameDescriptor`] is produced once by the (external) decoding
//! collaborator and never mutated afterwards.  The forwarding engine keeps it
//! by value inside the ingress queue of the port it arrived on until every
//! egress port in its destination set has been served.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Switch port index, `0..port_count`.
pub type PortId = usize;

/// 802.1Q VLAN identifier.  Only `0..256` map onto the membership table.
pub type VlanId = u16;

/// Opaque handle the transmitter uses to find the frame payload.
pub type FrameHandle = u64;

/// Number of traffic classes (802.1Q priority code points).
pub const NUM_CLASSES: usize = 8;

/// Maximum number of ports a [`PortSet`] can hold.
pub const MAX_PORTS: usize = 32;

// ── Traffic class ─────────────────────────────────────────────────────────────

/// Traffic class `0..=7`; higher numbers are higher priority.
///
/// Constructed only through [`TrafficClass::new`], so an out-of-range class
/// cannot exist past the decoding boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct TrafficClass(u8);

impl TrafficClass {
    /// Returns `None` for values `>= 8`.
    pub fn new(class: u8) -> Option<Self> {
        ((class as usize) < NUM_CLASSES).then_some(Self(class))
    }

    /// Map a priority code point onto a class, saturating at 7.
    pub fn from_priority(priority: u8) -> Self {
        Self(priority.min((NUM_CLASSES - 1) as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// All classes from highest to lowest (strict-priority evaluation order).
    pub fn descending() -> impl Iterator<Item = TrafficClass> {
        (0..NUM_CLASSES as u8).rev().map(TrafficClass)
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TC{}", self.0)
    }
}

// ── MAC address ───────────────────────────────────────────────────────────────

/// 48-bit IEEE 802 MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Group bit (I/G) set: broadcast or multicast.
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn to_u64(self) -> u64 {
        self.0.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Error returned when a string is not a colon- or dash-separated MAC address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: '{0}'")]
pub struct ParseMacError(pub String);

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(ParseMacError(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (o, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(ParseMacError(s.to_string()));
            }
            *o = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Port set ──────────────────────────────────────────────────────────────────

/// Bit set of switch ports (bit N = port N).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct PortSet(u32);

impl PortSet {
    pub const EMPTY: PortSet = PortSet(0);

    /// Every port `0..count`.
    pub fn all(count: usize) -> Self {
        if count >= MAX_PORTS {
            Self(u32::MAX)
        } else {
            Self((1u32 << count) - 1)
        }
    }

    pub fn single(port: PortId) -> Self {
        let mut s = Self::EMPTY;
        s.insert(port);
        s
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, port: PortId) -> bool {
        port < MAX_PORTS && (self.0 >> port) & 1 == 1
    }

    pub fn insert(&mut self, port: PortId) {
        if port < MAX_PORTS {
            self.0 |= 1 << port;
        }
    }

    pub fn remove(&mut self, port: PortId) {
        if port < MAX_PORTS {
            self.0 &= !(1 << port);
        }
    }

    pub fn without(mut self, port: PortId) -> Self {
        self.remove(port);
        self
    }

    pub fn intersect(self, other: PortSet) -> Self {
        Self(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = PortId> {
        (0..MAX_PORTS).filter(move |&p| self.contains(p))
    }
}

impl FromIterator<PortId> for PortSet {
    fn from_iter<I: IntoIterator<Item = PortId>>(iter: I) -> Self {
        let mut s = PortSet::EMPTY;
        for p in iter {
            s.insert(p);
        }
        s
    }
}

// ── Frame descriptor (input) ──────────────────────────────────────────────────

/// One received frame as produced by the decoding collaborator.
///
/// Immutable once produced.  `arrival_time_ns` is the first-byte timestamp in
/// network time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameDescriptor {
    /// Handle passed through to the transmitter.
    pub handle: FrameHandle,
    pub src_mac: MacAddress,
    pub dst_mac: MacAddress,
    pub ether_type: u16,
    pub vlan_id: VlanId,
    /// Priority code point `0..=7`.
    pub priority: u8,
    pub length_bytes: u32,
    pub arrival_time_ns: u64,
    pub ingress_port: PortId,
}

impl FrameDescriptor {
    pub fn class(&self) -> TrafficClass {
        TrafficClass::from_priority(self.priority)
    }
}

// ── Transmission grant (output) ───────────────────────────────────────────────

/// How the egress relays a granted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RelayMode {
    /// Relay started before the frame was fully received.
    CutThrough,
    /// Relay started after the complete frame was buffered.
    StoreAndForward,
}

/// Grant handed to the transmission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransmissionGrant {
    pub port: PortId,
    pub frame: FrameHandle,
    pub priority: TrafficClass,
    pub grant_time_ns: u64,
    pub mode: RelayMode,
    /// Strip the VLAN tag on this egress port.
    pub untagged: bool,
}

/// Serialisation time of `bytes` on a link of `line_rate_bps`, rounded up to
/// whole nanoseconds.
pub fn wire_time_ns(bytes: u64, line_rate_bps: u64) -> u64 {
    if line_rate_bps == 0 {
        return u64::MAX;
    }
    let bits = bytes as u128 * 8 * 1_000_000_000;
    bits.div_ceil(line_rate_bps as u128) as u64
}

// ── Tests ─────────────────────────────────────────────────────────────────────
