/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time synchronisation messages, already decoded.

use std::fmt;

use serde::Serialize;

/// Device identity used for best-master election.  Lower wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct ClockIdentity(pub u64);

impl fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Announce / sync message exchanged between devices of one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncMessage {
    /// "I am (or want to be) master."
    Announce { source: ClockIdentity, domain: u8 },
    /// Master's network time at transmission.
    Sync {
        source: ClockIdentity,
        domain: u8,
        timestamp_ns: u64,
    },
}

impl SyncMessage {
    pub fn source(&self) -> ClockIdentity {
        match *self {
            SyncMessage::Announce { source, .. } | SyncMessage::Sync { source, .. } => source,
        }
    }

    pub fn domain(&self) -> u8 {
        match *self {
            SyncMessage::Announce { domain, .. } | SyncMessage::Sync { domain, .. } => domain,
        }
    }
}
