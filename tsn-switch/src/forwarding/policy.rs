/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Ingress admission: port enable, source-address security, blocked
//! EtherTypes and VLAN membership.

use std::collections::BTreeSet;
use std::fmt;

use crate::config::{SwitchConfig, VLAN_TABLE_SIZE};
use crate::frame::{FrameDescriptor, MacAddress, PortId, PortSet, VlanId};

/// Why a frame was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Ingress port is disabled.
    IngressDisabled,
    /// Source MAC outside the allowed range.
    SecurityViolation,
    BlockedEtherType(u16),
    /// VLAN id out of table range, or ingress port not a member.
    VlanViolation { vlan: VlanId },
    /// Destination is bound to the ingress port.
    WouldLoop,
    /// Nothing left after VLAN membership and the port enable mask.
    NoDestination,
    IngressQueueFull,
    /// Aborted by the decoding collaborator before relay.
    Aborted,
}

impl DropReason {
    /// Counted as a security violation.
    pub fn is_security(self) -> bool {
        matches!(self, DropReason::SecurityViolation | DropReason::BlockedEtherType(_))
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::IngressDisabled => write!(f, "ingress port disabled"),
            DropReason::SecurityViolation => write!(f, "source MAC not allowed"),
            DropReason::BlockedEtherType(t) => write!(f, "blocked EtherType 0x{t:04X}"),
            DropReason::VlanViolation { vlan } => write!(f, "VLAN {vlan} violation"),
            DropReason::WouldLoop => write!(f, "destination bound to ingress port"),
            DropReason::NoDestination => write!(f, "no destination port"),
            DropReason::IngressQueueFull => write!(f, "ingress queue full"),
            DropReason::Aborted => write!(f, "aborted"),
        }
    }
}

/// Read-only policy tables derived from the configuration.
#[derive(Debug, Clone)]
pub struct IngressPolicy {
    port_enable_mask: PortSet,
    security_enable: bool,
    allowed_mac_base: u64,
    allowed_mac_mask: u64,
    blocked_ether_types: BTreeSet<u16>,
    vlan_membership: Vec<PortSet>,
    vlan_untag: Vec<PortSet>,
}

impl IngressPolicy {
    pub fn new(cfg: &SwitchConfig) -> Self {
        let f = &cfg.forwarding;
        Self {
            port_enable_mask: cfg.port_enable_mask,
            security_enable: f.security_enable,
            allowed_mac_base: f.allowed_mac_base.to_u64(),
            allowed_mac_mask: f.allowed_mac_mask.to_u64(),
            blocked_ether_types: f.blocked_ether_types.clone(),
            vlan_membership: f.vlan_membership.clone(),
            vlan_untag: f.vlan_untag.clone(),
        }
    }

    pub fn port_enable_mask(&self) -> PortSet {
        self.port_enable_mask
    }

    pub fn is_enabled(&self, port: PortId) -> bool {
        self.port_enable_mask.contains(port)
    }

    /// `src & mask == base & mask`; always true with security off.
    pub fn source_allowed(&self, src: MacAddress) -> bool {
        !self.security_enable
            || src.to_u64() & self.allowed_mac_mask == self.allowed_mac_base & self.allowed_mac_mask
    }

    pub fn vlan_members(&self, vlan: VlanId) -> PortSet {
        self.vlan_membership
            .get(vlan as usize)
            .copied()
            .unwrap_or(PortSet::EMPTY)
    }

    /// Whether `vlan` leaves `port` untagged.
    pub fn is_untagged(&self, vlan: VlanId, port: PortId) -> bool {
        self.vlan_untag
            .get(vlan as usize)
            .is_some_and(|s| s.contains(port))
    }

    /// Ingress checks in order: port enable, source security, EtherType,
    /// VLAN membership of the ingress port.
    pub fn admit(&self, frame: &FrameDescriptor) -> Result<(), DropReason> {
        if !self.is_enabled(frame.ingress_port) {
            return Err(DropReason::IngressDisabled);
        }
        if !self.source_allowed(frame.src_mac) {
            return Err(DropReason::SecurityViolation);
        }
        if self.blocked_ether_types.contains(&frame.ether_type) {
            return Err(DropReason::BlockedEtherType(frame.ether_type));
        }
        if frame.vlan_id as usize >= VLAN_TABLE_SIZE
            || !self.vlan_members(frame.vlan_id).contains(frame.ingress_port)
        {
            return Err(DropReason::VlanViolation { vlan: frame.vlan_id });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(src: [u8; 6], ether_type: u16, vlan: VlanId, ingress: PortId) -> FrameDescriptor {
        FrameDescriptor {
            src_mac: MacAddress::new(src),
            dst_mac: MacAddress::BROADCAST,
            ether_type,
            vlan_id: vlan,
            ingress_port: ingress,
            length_bytes: 64,
            ..Default::default()
        }
    }

    fn secured_config() -> SwitchConfig {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.security_enable = true;
        cfg.forwarding.allowed_mac_base = MacAddress::new([0x02, 0x10, 0, 0, 0, 0]);
        cfg.forwarding.allowed_mac_mask = MacAddress::new([0xFF, 0xFF, 0, 0, 0, 0]);
        cfg.forwarding.blocked_ether_types.insert(0x88CC);
        cfg
    }

    #[test]
    fn source_inside_masked_range_is_admitted() {
        let p = IngressPolicy::new(&secured_config());
        assert_eq!(p.admit(&frame([0x02, 0x10, 9, 9, 9, 9], 0x0800, 1, 0)), Ok(()));
        assert_eq!(
            p.admit(&frame([0x02, 0x11, 0, 0, 0, 1], 0x0800, 1, 0)),
            Err(DropReason::SecurityViolation)
        );
    }

    #[test]
    fn blocked_ether_type_applies_without_security() {
        let mut cfg = secured_config();
        cfg.forwarding.security_enable = false;
        let p = IngressPolicy::new(&cfg);
        let d = p.admit(&frame([0xAA, 0, 0, 0, 0, 1], 0x88CC, 1, 0));
        assert_eq!(d, Err(DropReason::BlockedEtherType(0x88CC)));
        assert!(d.unwrap_err().is_security());
    }

    #[test]
    fn ingress_must_be_vlan_member() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.vlan_membership[10] = PortSet::from_iter([0, 1]);
        let p = IngressPolicy::new(&cfg);
        assert_eq!(p.admit(&frame([2, 0, 0, 0, 0, 1], 0x0800, 10, 1)), Ok(()));
        assert_eq!(
            p.admit(&frame([2, 0, 0, 0, 0, 1], 0x0800, 10, 2)),
            Err(DropReason::VlanViolation { vlan: 10 })
        );
        assert_eq!(
            p.admit(&frame([2, 0, 0, 0, 0, 1], 0x0800, 4000, 0)),
            Err(DropReason::VlanViolation { vlan: 4000 })
        );
    }

    #[test]
    fn disabled_ingress_is_checked_first() {
        let mut cfg = secured_config();
        cfg.port_enable_mask = PortSet::from_iter([0, 1]);
        let p = IngressPolicy::new(&cfg);
        assert_eq!(
            p.admit(&frame([0xAA, 0, 0, 0, 0, 1], 0x88CC, 1, 3)),
            Err(DropReason::IngressDisabled)
        );
    }

    #[test]
    fn untag_lookup_tolerates_out_of_range_vlan() {
        let mut cfg = SwitchConfig::default();
        cfg.forwarding.vlan_untag[5] = PortSet::single(2);
        let p = IngressPolicy::new(&cfg);
        assert!(p.is_untagged(5, 2));
        assert!(!p.is_untagged(5, 1));
        assert!(!p.is_untagged(999, 2));
    }
}
