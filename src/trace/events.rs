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

//! Trace event definitions for queue disciplines and congestion estimators.

use serde::Deserialize;
use serde::Serialize;

use crate::queue_disc::DropReason;

/// A timestamped trace record.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Event {
    /// Milliseconds since the start of the trace.
    pub time: f32,

    /// The per-event metadata.
    #[serde(flatten)]
    pub data: EventData,

    /// Entity the event belongs to, e.g. the flow or the bottleneck name, for
    /// traces that aggregate several sources into one file.
    pub group_id: Option<String>,
}

impl Event {
    pub fn new(time: f32, data: EventData) -> Self {
        Event {
            time,
            data,
            group_id: None,
        }
    }

    pub fn importance(&self) -> EventImportance {
        self.data.importance()
    }
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "name", content = "data")]
pub enum EventData {
    /// A queue discipline discarded a packet.
    #[serde(rename = "aqm:packet_dropped")]
    PacketDropped {
        flow_id: u64,
        seq: u64,
        size: u64,
        reason: DropReason,
    },

    /// A queue discipline set the CE codepoint on an admitted packet.
    #[serde(rename = "aqm:packet_marked")]
    PacketMarked {
        flow_id: u64,
        seq: u64,
        size: u64,
        reason: DropReason,
    },

    /// The mark probability was recalculated.
    #[serde(rename = "aqm:probability_updated")]
    ProbabilityUpdated {
        count_bytes: u64,
        q_avg: f64,
        mark_prob: f64,
    },

    /// Occupancy and delay of a queue, answered on external poll.
    #[serde(rename = "aqm:queue_sampled")]
    QueueSampled {
        packets: u64,
        bytes: u64,
        delay_us: u64,
    },

    /// A congestion estimator closed an estimation window.
    #[serde(rename = "recovery:congestion_estimate_updated")]
    CongestionEstimateUpdated {
        bytes_marked: u64,
        bytes_total: u64,
        alpha: f64,
    },
}

impl EventData {
    /// Returns a given EventImportance value for each event.
    pub fn importance(&self) -> EventImportance {
        match *self {
            EventData::CongestionEstimateUpdated { .. } => EventImportance::Core,
            EventData::ProbabilityUpdated { .. } => EventImportance::Core,
            EventData::PacketDropped { .. } => EventImportance::Base,
            EventData::QueueSampled { .. } => EventImportance::Base,
            EventData::PacketMarked { .. } => EventImportance::Extra,
        }
    }
}

/// An "importance indicator" in decreasing order of importance and expected
/// usage.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum EventImportance {
    /// Events that should be present in every trace.
    Core = 0,

    /// Per-packet events useful to explain the core ones.
    Base = 1,

    /// Events mostly useful for low-level debugging.
    Extra = 2,
}

impl EventImportance {
    /// Return true if this importance level is included by `other`.
    pub fn is_contained_in(&self, other: &EventImportance) -> bool {
        self <= other
    }
}
