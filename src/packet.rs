// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

/// ECN field of the IP header.
///
/// See RFC 3168 Section 5.
/// ```text
/// +-----+-----+
/// | ECN FIELD |
/// +-----+-----+
///   0     0         Not-ECT
///   0     1         ECT(1)
///   1     0         ECT(0)
///   1     1         CE
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcnCodepoint {
    /// Not ECN-Capable Transport.
    #[default]
    NotEct = 0,

    /// ECN-Capable Transport(1).
    Ect1 = 1,

    /// ECN-Capable Transport(0).
    Ect0 = 2,

    /// Congestion Experienced.
    Ce = 3,
}

impl EcnCodepoint {
    /// Decode the two ECN bits.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b01 => EcnCodepoint::Ect1,
            0b10 => EcnCodepoint::Ect0,
            0b11 => EcnCodepoint::Ce,
            _ => EcnCodepoint::NotEct,
        }
    }

    /// Encode into the two ECN bits.
    pub fn to_bits(self) -> u8 {
        self as u8
    }

    /// Whether the transport opted into ECN for this packet.
    pub fn is_ecn_capable(self) -> bool {
        self != EcnCodepoint::NotEct
    }
}

/// A packet crossing a queue discipline.
///
/// Only the metadata needed by queue management is carried; payload bytes are
/// represented by `size`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Packet {
    /// Size in bytes.
    pub size: u64,

    /// ECN codepoint, set by the sender and possibly rewritten to CE by a
    /// queue discipline.
    pub ecn: EcnCodepoint,

    /// Identifier of the flow that sent the packet.
    pub flow_id: u64,

    /// Sequence number of the first payload byte within the flow.
    pub seq: u64,

    /// Time the packet entered the queue. Assigned by the queue.
    timestamp: Option<Instant>,
}

impl Packet {
    pub fn new(size: u64, ecn: EcnCodepoint) -> Self {
        Packet {
            size,
            ecn,
            ..Packet::default()
        }
    }

    /// Attach the flow id and sequence number.
    pub fn with_flow(mut self, flow_id: u64, seq: u64) -> Self {
        self.flow_id = flow_id;
        self.seq = seq;
        self
    }

    /// Time the packet entered its current queue.
    pub fn timestamp(&self) -> Option<Instant> {
        self.timestamp
    }

    pub(crate) fn set_timestamp(&mut self, now: Instant) {
        self.timestamp = Some(now);
    }

    /// Set the CE codepoint. Return false if the packet is not ECN-capable
    /// and therefore cannot carry the mark.
    pub fn mark(&mut self) -> bool {
        if !self.ecn.is_ecn_capable() {
            return false;
        }
        self.ecn = EcnCodepoint::Ce;
        true
    }

    /// Whether a queue marked the packet as congestion experienced.
    pub fn is_ce(&self) -> bool {
        self.ecn == EcnCodepoint::Ce
    }
}
