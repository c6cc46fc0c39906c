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

//! Link rate and queue limit units.

use core::str::FromStr;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Split "100Mbps" into ("100", "Mbps").
fn split_number(s: &str) -> (&str, &str) {
    let idx = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    s.split_at(idx)
}

/// Multiplier of a decimal SI prefix.
fn si_prefix(prefix: &str) -> Option<u64> {
    match prefix {
        "" => Some(1),
        "k" | "K" => Some(1_000),
        "M" => Some(1_000_000),
        "G" => Some(1_000_000_000),
        "T" => Some(1_000_000_000_000),
        _ => None,
    }
}

/// Transmission rate of a link in bits per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataRate(u64);

impl DataRate {
    pub const fn from_bps(bps: u64) -> Self {
        DataRate(bps)
    }

    pub const fn from_mbps(mbps: u64) -> Self {
        DataRate(mbps * 1_000_000)
    }

    /// Rate in bits per second.
    pub fn bit_rate(&self) -> u64 {
        self.0
    }

    /// Number of bytes the link carries during `interval`, truncated.
    pub fn bytes_in(&self, interval: Duration) -> u64 {
        (self.0 as u128 * interval.as_nanos() / 8 / 1_000_000_000) as u64
    }

    /// Time needed to serialize `bytes` onto the link.
    pub fn transmission_time(&self, bytes: u64) -> Duration {
        if self.0 == 0 {
            return Duration::MAX;
        }
        let nanos = bytes as u128 * 8 * 1_000_000_000 / self.0 as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

impl FromStr for DataRate {
    type Err = Error;

    fn from_str(rate: &str) -> Result<DataRate> {
        let (number, unit) = split_number(rate.trim());
        let value: f64 = number
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("bad data rate {:?}", rate)))?;

        let prefix = unit
            .strip_suffix("bps")
            .or_else(|| unit.strip_suffix("b/s"))
            .ok_or_else(|| Error::InvalidConfig(format!("bad data rate unit {:?}", rate)))?;
        let mult = si_prefix(prefix)
            .ok_or_else(|| Error::InvalidConfig(format!("bad data rate prefix {:?}", rate)))?;

        Ok(DataRate((value * mult as f64).round() as u64))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (mult, prefix) in [(1_000_000_000, "G"), (1_000_000, "M"), (1_000, "k")] {
            if self.0 >= mult && self.0 % mult == 0 {
                return write!(f, "{}{}bps", self.0 / mult, prefix);
            }
        }
        write!(f, "{}bps", self.0)
    }
}

/// Unit used to express the limit of a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueSizeUnit {
    /// The queue is limited by the number of packets.
    Packets,

    /// The queue is limited by the number of bytes.
    Bytes,
}

/// Capacity of a queue, in packets or bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSize {
    pub unit: QueueSizeUnit,
    pub value: u64,
}

impl QueueSize {
    pub const fn packets(value: u64) -> Self {
        QueueSize {
            unit: QueueSizeUnit::Packets,
            value,
        }
    }

    pub const fn bytes(value: u64) -> Self {
        QueueSize {
            unit: QueueSizeUnit::Bytes,
            value,
        }
    }

    /// Current occupancy expressed in this queue size's unit.
    pub fn occupancy(&self, n_packets: u64, n_bytes: u64) -> u64 {
        match self.unit {
            QueueSizeUnit::Packets => n_packets,
            QueueSizeUnit::Bytes => n_bytes,
        }
    }

    /// Whether adding a packet of `size` bytes on top of the given occupancy
    /// would exceed this limit.
    pub fn would_overflow(&self, n_packets: u64, n_bytes: u64, size: u64) -> bool {
        match self.unit {
            QueueSizeUnit::Packets => n_packets.saturating_add(1) > self.value,
            QueueSizeUnit::Bytes => n_bytes.saturating_add(size) > self.value,
        }
    }
}

impl Default for QueueSize {
    fn default() -> Self {
        QueueSize::packets(crate::DEFAULT_QUEUE_LIMIT_PACKETS)
    }
}

impl FromStr for QueueSize {
    type Err = Error;

    fn from_str(size: &str) -> Result<QueueSize> {
        let (number, unit) = split_number(size.trim());
        let value: u64 = number
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("bad queue size {:?}", size)))?;

        let (prefix, unit) = if let Some(prefix) = unit.strip_suffix('p') {
            (prefix, QueueSizeUnit::Packets)
        } else if let Some(prefix) = unit.strip_suffix('B') {
            (prefix, QueueSizeUnit::Bytes)
        } else {
            return Err(Error::InvalidConfig(format!(
                "bad queue size unit {:?}",
                size
            )));
        };
        let mult = si_prefix(prefix)
            .ok_or_else(|| Error::InvalidConfig(format!("bad queue size prefix {:?}", size)))?;

        Ok(QueueSize {
            unit,
            value: value.saturating_mul(mult),
        })
    }
}

impl fmt::Display for QueueSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            QueueSizeUnit::Packets => write!(f, "{}p", self.value),
            QueueSizeUnit::Bytes => write!(f, "{}B", self.value),
        }
    }
}
