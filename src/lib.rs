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

//! SHQ is an active queue management discipline paired with an
//! ECN-proportional sender congestion estimator.
//!
//! ## Components
//!
//! * **Queue disciplines**: [`Shq`] keeps a bounded FIFO, recomputes a mark
//!   probability from the smoothed per-interval backlog, and marks or drops
//!   packets on enqueue. [`FifoQueueDisc`] is the drop-tail baseline.
//! * **Congestion controllers**: [`Lgc`] estimates the fraction of ECN-marked
//!   bytes per window of acknowledgments and scales its window reduction
//!   with it. [`Reno`] is the loss-based baseline.
//! * **Observability**: components buffer trace events that a harness polls
//!   and writes out as JSON text sequences.
//!
//! The two sides share no state. The only coupling is the CE codepoint set on
//! a [`Packet`] by the queue and echoed back to the sender as ECE.
//!
//! ## Time
//!
//! Nothing in the crate reads a clock. Every operation takes the current
//! `Instant`, and components with internal timers expose `timeout()` and
//! `on_timeout()`, so a discrete-event harness drives them in simulated time.
//!
//! ## Get started
//!
//! The `shq_sim` tool in the `tools/` workspace member runs competing flows
//! through a bottleneck and writes their traces.

#![allow(unused_imports)]
#![allow(dead_code)]

/// The default queue limit of a queue discipline, in packets.
pub const DEFAULT_QUEUE_LIMIT_PACKETS: u64 = 100;

/// The default sender maximum segment size in bytes.
pub const DEFAULT_SEGMENT_SIZE: u64 = 1448;

/// A specialized [`Result`] type for SHQ operations.
///
/// This type is used throughout the public API for any operation that
/// can produce an error.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

pub use crate::congestion_control::CongestionControlConfig;
pub use crate::congestion_control::CongestionControlRegistry;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionEstimate;
pub use crate::congestion_control::CongestionStats;
pub use crate::congestion_control::EcnMode;
pub use crate::congestion_control::EcnState;
pub use crate::congestion_control::Lgc;
pub use crate::congestion_control::Reno;
pub use crate::congestion_control::TransportState;
pub use crate::error::Error;
pub use crate::packet::EcnCodepoint;
pub use crate::packet::Packet;
pub use crate::queue_disc::DropReason;
pub use crate::queue_disc::FifoQueueDisc;
pub use crate::queue_disc::QueueDisc;
pub use crate::queue_disc::QueueDiscConfig;
pub use crate::queue_disc::QueueDiscRegistry;
pub use crate::queue_disc::QueueDiscStats;
pub use crate::queue_disc::QueueSample;
pub use crate::queue_disc::Shq;
pub use crate::registry::Registry;
pub use crate::scheduler::EventId;
pub use crate::scheduler::Scheduler;
pub use crate::units::DataRate;
pub use crate::units::QueueSize;
pub use crate::units::QueueSizeUnit;

#[cfg(test)]
mod tests {
    #[ctor::ctor]
    fn init() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .format_timestamp_millis()
            .is_test(true)
            .init();
    }
}

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

#[path = "queue_disc/queue_disc.rs"]
pub mod queue_disc;

#[path = "trace/trace.rs"]
pub mod trace;

pub mod error;
pub mod packet;
pub mod registry;
pub mod scheduler;
pub mod units;
