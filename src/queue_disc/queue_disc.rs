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

#![allow(unused_variables)]

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use log::*;
use serde::Deserialize;
use serde::Serialize;
use strum::EnumCount;
use strum_macros::EnumCount as EnumCountMacro;
use strum_macros::EnumIter;

use crate::packet::Packet;
use crate::registry::Registry;
use crate::trace::EventData;
use crate::trace::EventQueue;
use crate::units::DataRate;
use crate::units::QueueSize;
use crate::Error;
use crate::Result;
pub use drop_tail::DropTailQueue;
pub use fifo::FifoQueueDisc;
pub use shq::Shq;
pub use shq::ShqConfig;

/// Why a queue discipline discarded or marked a packet.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCountMacro, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Reactive drop: the packet would have exceeded the queue limit.
    ForcedDrop,

    /// Proactive drop: the packet was selected for marking but could not
    /// carry the mark.
    UnforcedDrop,

    /// Proactive mark: the packet was admitted with the CE codepoint set.
    UnforcedMark,

    /// The internal queue rejected a packet that the discipline admitted.
    InternalQueueDrop,

    /// The discipline was not initialized or already disposed.
    Inactive,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::ForcedDrop => "Forced drop",
            DropReason::UnforcedDrop => "Unforced drop",
            DropReason::UnforcedMark => "Unforced mark",
            DropReason::InternalQueueDrop => "Internal queue drop",
            DropReason::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue discipline statistics.
#[derive(Debug, Default, Clone)]
pub struct QueueDiscStats {
    /// Packets offered to the discipline.
    pub received_packets: u64,

    /// Bytes offered to the discipline.
    pub received_bytes: u64,

    /// Packets admitted into the queue.
    pub enqueued_packets: u64,

    /// Bytes admitted into the queue.
    pub enqueued_bytes: u64,

    /// Packets handed to the link.
    pub dequeued_packets: u64,

    /// Bytes handed to the link.
    pub dequeued_bytes: u64,

    /// Dropped packets per reason.
    dropped_packets: [u64; DropReason::COUNT],

    /// Dropped bytes per reason.
    dropped_bytes: [u64; DropReason::COUNT],

    /// Marked packets per reason.
    marked_packets: [u64; DropReason::COUNT],

    /// Marked bytes per reason.
    marked_bytes: [u64; DropReason::COUNT],
}

impl QueueDiscStats {
    /// Packets dropped for the given reason.
    pub fn dropped_packets(&self, reason: DropReason) -> u64 {
        self.dropped_packets[reason as usize]
    }

    /// Bytes dropped for the given reason.
    pub fn dropped_bytes(&self, reason: DropReason) -> u64 {
        self.dropped_bytes[reason as usize]
    }

    /// Packets marked for the given reason.
    pub fn marked_packets(&self, reason: DropReason) -> u64 {
        self.marked_packets[reason as usize]
    }

    /// Bytes marked for the given reason.
    pub fn marked_bytes(&self, reason: DropReason) -> u64 {
        self.marked_bytes[reason as usize]
    }

    /// Packets dropped for any reason.
    pub fn total_dropped_packets(&self) -> u64 {
        self.dropped_packets.iter().sum()
    }

    /// Packets marked for any reason.
    pub fn total_marked_packets(&self) -> u64 {
        self.marked_packets.iter().sum()
    }
}

/// Occupancy and queueing delay answered on external poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSample {
    pub time: Instant,
    pub packets: u64,
    pub bytes: u64,
    pub delay: Duration,
}

/// A classifier that steers packets to child classes of a queue discipline.
pub trait PacketFilter {
    /// Return the child class for the packet, or None if the filter does not
    /// match it.
    fn classify(&self, pkt: &Packet) -> Option<usize>;
}

/// Configurations about queue disciplines.
///
/// Options not used by the selected algorithm are ignored.
#[derive(Debug, Clone)]
pub struct QueueDiscConfig {
    /// Maximum number of packets or bytes accepted by the discipline.
    pub max_size: QueueSize,

    /// Smoothing factor of the SHQ backlog average.
    pub shq_alpha: f64,

    /// Period of the SHQ mark probability recalculation.
    pub shq_interval: Duration,

    /// Delay between initialization and the first SHQ recalculation.
    pub shq_start_update: Duration,

    /// Average packet size in bytes, used to convert standing backlog to
    /// bytes.
    pub mean_pkt_size: u64,

    /// Maximum mark probability of SHQ.
    pub shq_max_p: f64,

    /// Rate of the link the discipline feeds.
    pub link_bandwidth: DataRate,

    /// Mark ECN-capable packets instead of dropping them.
    pub use_ecn: bool,

    /// Seed of the random stream, None to seed from OS entropy.
    pub seed: Option<u64>,
}

impl QueueDiscConfig {
    /// Set the queue limit. The default value is 100 packets.
    pub fn set_max_size(&mut self, v: QueueSize) {
        self.max_size = v;
    }

    /// Set the smoothing factor in (0, 1]. The default value is 0.25.
    pub fn set_shq_alpha(&mut self, v: f64) {
        self.shq_alpha = v;
    }

    /// Set the recalculation interval in milliseconds. The default value is
    /// 15.
    pub fn set_shq_interval(&mut self, millis: u64) {
        self.shq_interval = Duration::from_millis(millis);
    }

    /// Set the start time of the recalculation timer in milliseconds. The
    /// default value is 0.
    pub fn set_shq_start_update(&mut self, millis: u64) {
        self.shq_start_update = Duration::from_millis(millis);
    }

    /// Set the mean packet size in bytes. The default value is 1000.
    pub fn set_mean_pkt_size(&mut self, v: u64) {
        self.mean_pkt_size = v;
    }

    /// Set the maximum mark probability. The default value is 0.9.
    pub fn set_shq_max_p(&mut self, v: f64) {
        self.shq_max_p = v;
    }

    /// Set the link bandwidth. The default value is 100Mbps.
    pub fn set_link_bandwidth(&mut self, v: DataRate) {
        self.link_bandwidth = v;
    }

    /// Enable ECN marking. The default value is true.
    pub fn enable_ecn(&mut self, v: bool) {
        self.use_ecn = v;
    }

    /// Seed the random stream for reproducible runs.
    pub fn set_seed(&mut self, v: u64) {
        self.seed = Some(v);
    }
}

impl Default for QueueDiscConfig {
    fn default() -> Self {
        Self {
            max_size: QueueSize::packets(crate::DEFAULT_QUEUE_LIMIT_PACKETS),
            shq_alpha: 0.25,
            shq_interval: Duration::from_millis(15),
            shq_start_update: Duration::ZERO,
            mean_pkt_size: 1000,
            shq_max_p: 0.9,
            link_bandwidth: DataRate::from_mbps(100),
            use_ecn: true,
            seed: None,
        }
    }
}

/// State and bookkeeping shared by every queue discipline.
pub struct QueueDiscCore {
    /// Limit of the discipline.
    max_size: QueueSize,

    /// Internal queues holding admitted packets.
    internal_queues: Vec<DropTailQueue>,

    /// Packet filters.
    filters: Vec<Box<dyn PacketFilter>>,

    /// Child queue disciplines.
    classes: Vec<Box<dyn QueueDisc>>,

    stats: QueueDiscStats,

    events: EventQueue,

    initialized: bool,

    disposed: bool,
}

impl QueueDiscCore {
    pub fn new(max_size: QueueSize) -> Self {
        Self {
            max_size,
            internal_queues: Vec::new(),
            filters: Vec::new(),
            classes: Vec::new(),
            stats: QueueDiscStats::default(),
            events: EventQueue::default(),
            initialized: false,
            disposed: false,
        }
    }

    pub fn max_size(&self) -> QueueSize {
        self.max_size
    }

    /// Whether the discipline accepts traffic.
    pub fn is_active(&self) -> bool {
        self.initialized && !self.disposed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Validate the structure of a terminal, unclassed discipline: no child
    /// classes, no packet filters, and exactly one internal queue. A bounded
    /// FIFO sized to the discipline limit is provisioned if none was added.
    pub fn check_leaf_config(&mut self, name: &str) -> Result<()> {
        if self.initialized {
            return Err(Error::InvalidState("already initialized".into()));
        }

        if !self.classes.is_empty() {
            error!("{} cannot have classes", name);
            return Err(Error::InvalidConfig(format!("{} cannot have classes", name)));
        }

        if !self.filters.is_empty() {
            error!("{} cannot have packet filters", name);
            return Err(Error::InvalidConfig(format!(
                "{} cannot have packet filters",
                name
            )));
        }

        if self.internal_queues.is_empty() {
            self.internal_queues.push(DropTailQueue::new(self.max_size));
        }

        if self.internal_queues.len() != 1 {
            error!("{} needs 1 internal queue", name);
            return Err(Error::InvalidConfig(format!(
                "{} needs 1 internal queue",
                name
            )));
        }

        Ok(())
    }

    /// Mark the discipline as ready to accept traffic.
    pub fn set_initialized(&mut self) {
        self.initialized = true;
    }

    /// The single internal queue of a leaf discipline.
    pub fn queue(&self) -> Option<&DropTailQueue> {
        self.internal_queues.first()
    }

    pub fn queue_mut(&mut self) -> Option<&mut DropTailQueue> {
        self.internal_queues.first_mut()
    }

    /// Packets held by the internal queues.
    pub fn n_packets(&self) -> u64 {
        self.internal_queues.iter().map(|q| q.n_packets()).sum()
    }

    /// Bytes held by the internal queues.
    pub fn n_bytes(&self) -> u64 {
        self.internal_queues.iter().map(|q| q.n_bytes()).sum()
    }

    /// Whether admitting a packet of `size` bytes would exceed the limit.
    pub fn would_overflow(&self, size: u64) -> bool {
        self.max_size
            .would_overflow(self.n_packets(), self.n_bytes(), size)
    }

    /// Account for a packet offered to the discipline.
    pub fn on_received(&mut self, pkt: &Packet) {
        self.stats.received_packets += 1;
        self.stats.received_bytes += pkt.size;
    }

    /// Discard a packet that was not admitted.
    pub fn drop_before_enqueue(&mut self, now: Instant, pkt: Packet, reason: DropReason) {
        trace!(
            "drop packet flow={} seq={} size={} reason={}",
            pkt.flow_id,
            pkt.seq,
            pkt.size,
            reason
        );
        self.stats.dropped_packets[reason as usize] += 1;
        self.stats.dropped_bytes[reason as usize] += pkt.size;
        self.events.add(
            now,
            EventData::PacketDropped {
                flow_id: pkt.flow_id,
                seq: pkt.seq,
                size: pkt.size,
                reason,
            },
        );
    }

    /// Set the CE codepoint on a packet. Return false if the packet is not
    /// ECN-capable, in which case nothing is recorded.
    pub fn mark(&mut self, now: Instant, pkt: &mut Packet, reason: DropReason) -> bool {
        if !pkt.mark() {
            return false;
        }

        self.stats.marked_packets[reason as usize] += 1;
        self.stats.marked_bytes[reason as usize] += pkt.size;
        self.events.add(
            now,
            EventData::PacketMarked {
                flow_id: pkt.flow_id,
                seq: pkt.seq,
                size: pkt.size,
                reason,
            },
        );
        true
    }

    /// Timestamp a packet and append it to the internal queue.
    pub fn enqueue_internal(&mut self, now: Instant, mut pkt: Packet) -> bool {
        pkt.set_timestamp(now);
        let size = pkt.size;

        let res = match self.internal_queues.first_mut() {
            Some(q) => q.enqueue(pkt),
            None => Err(pkt),
        };
        match res {
            Ok(()) => {
                self.stats.enqueued_packets += 1;
                self.stats.enqueued_bytes += size;
                true
            }
            Err(pkt) => {
                self.drop_before_enqueue(now, pkt, DropReason::InternalQueueDrop);
                false
            }
        }
    }

    /// Remove the head of the internal queue.
    pub fn dequeue_internal(&mut self) -> Option<Packet> {
        let pkt = self.internal_queues.first_mut()?.dequeue()?;
        self.stats.dequeued_packets += 1;
        self.stats.dequeued_bytes += pkt.size;
        Some(pkt)
    }

    /// Stop accepting traffic and release queued packets.
    pub fn dispose(&mut self, now: Instant) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let mut released = Vec::new();
        for q in self.internal_queues.iter_mut() {
            released.extend(q.drain());
        }
        for pkt in released {
            self.drop_before_enqueue(now, pkt, DropReason::Inactive);
        }
        for class in self.classes.iter_mut() {
            class.dispose(now);
        }
    }
}

/// Queue discipline interfaces shared by different algorithms.
///
/// The discipline does not own a clock. The harness reads `timeout()` and
/// calls `on_timeout()` once that instant is reached.
pub trait QueueDisc {
    /// Name of queue discipline algorithm.
    fn name(&self) -> &str;

    /// Shared state of the discipline.
    fn core(&self) -> &QueueDiscCore;

    fn core_mut(&mut self) -> &mut QueueDiscCore;

    /// Validate the configuration and start the discipline. Must be called
    /// once before the first enqueue.
    fn initialize(&mut self, now: Instant) -> Result<()>;

    /// Offer a packet. Return false if it was dropped.
    fn enqueue(&mut self, now: Instant, pkt: Packet) -> bool;

    /// Return the next packet to transmit, or None if the queue is idle.
    fn dequeue(&mut self, now: Instant) -> Option<Packet>;

    /// Time of the next internal timer, if any.
    fn timeout(&self) -> Option<Instant> {
        None
    }

    /// Process expired internal timers.
    fn on_timeout(&mut self, now: Instant) {}

    /// Current queueing delay.
    fn queue_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Cancel pending timers, release queued packets and stop accepting
    /// traffic.
    fn dispose(&mut self, now: Instant) {
        self.core_mut().dispose(now);
    }

    /// Add an internal queue. Must be called before `initialize()`.
    fn add_internal_queue(&mut self, queue: DropTailQueue) {
        self.core_mut().internal_queues.push(queue);
    }

    /// Add a packet filter. Must be called before `initialize()`.
    fn add_packet_filter(&mut self, filter: Box<dyn PacketFilter>) {
        self.core_mut().filters.push(filter);
    }

    /// Add a child queue discipline. Must be called before `initialize()`.
    fn add_class(&mut self, class: Box<dyn QueueDisc>) {
        self.core_mut().classes.push(class);
    }

    /// The oldest queued packet.
    fn peek(&self) -> Option<&Packet> {
        self.core().queue()?.peek()
    }

    /// Number of queued packets.
    fn n_packets(&self) -> u64 {
        self.core().n_packets()
    }

    /// Number of queued bytes.
    fn n_bytes(&self) -> u64 {
        self.core().n_bytes()
    }

    /// Occupancy and delay at `now`.
    fn sample(&mut self, now: Instant) -> QueueSample {
        let sample = QueueSample {
            time: now,
            packets: self.n_packets(),
            bytes: self.n_bytes(),
            delay: self.queue_delay(),
        };
        self.core_mut().events.add(
            now,
            EventData::QueueSampled {
                packets: sample.packets,
                bytes: sample.bytes,
                delay_us: sample.delay.as_micros() as u64,
            },
        );
        sample
    }

    /// Queue discipline stats.
    fn stats(&self) -> &QueueDiscStats {
        &self.core().stats
    }

    /// Start buffering trace events.
    fn enable_events(&mut self) {
        self.core_mut().events.enable();
    }

    /// Return the oldest buffered trace event.
    fn poll_event(&mut self) -> Option<(Instant, EventData)> {
        self.core_mut().events.poll()
    }

    /// The buffered trace events.
    fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.core_mut().events
    }
}

impl fmt::Debug for dyn QueueDisc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue disc {}.", self.name())
    }
}

fn new_fifo(conf: &QueueDiscConfig) -> Box<dyn QueueDisc> {
    Box::new(FifoQueueDisc::new(conf))
}

fn new_shq(conf: &QueueDiscConfig) -> Box<dyn QueueDisc> {
    Box::new(Shq::new(ShqConfig::from(conf)))
}

/// Constructor of a queue discipline.
pub type QueueDiscConstructor = fn(&QueueDiscConfig) -> Box<dyn QueueDisc>;

/// Queue disciplines by name.
pub type QueueDiscRegistry = Registry<QueueDiscConstructor>;

impl Registry<QueueDiscConstructor> {
    /// A registry holding the built-in disciplines.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("Fifo", new_fifo)
            .register("Shq", new_shq);
        registry
    }

    /// Build the queue discipline registered under `name`.
    pub fn build(&self, name: &str, conf: &QueueDiscConfig) -> Result<Box<dyn QueueDisc>> {
        Ok((self.get(name)?)(conf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::EcnCodepoint;
    use strum::IntoEnumIterator;

    #[test]
    fn queue_disc_name() {
        let registry = QueueDiscRegistry::with_builtin();
        let conf = QueueDiscConfig::default();

        let cases = [
            ("fifo", Ok("FIFO")),
            ("Fifo", Ok("FIFO")),
            ("FIFO", Ok("FIFO")),
            ("shq", Ok("SHQ")),
            ("Shq", Ok("SHQ")),
            ("SHQ", Ok("SHQ")),
            ("red", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, algor) in cases {
            let qdisc = registry.build(name, &conf);
            assert_eq!(qdisc.as_ref().map(|q| q.name()).map_err(|e| e.clone()), algor);
        }
        assert_eq!(registry.names(), vec!["Fifo", "Shq"]);
    }

    #[test]
    fn drop_reason_names() {
        for reason in DropReason::iter() {
            assert!(!reason.as_str().is_empty());
            assert_eq!(reason.to_string(), reason.as_str());
        }
        assert_eq!(DropReason::ForcedDrop.to_string(), "Forced drop");
        assert_eq!(DropReason::UnforcedMark.to_string(), "Unforced mark");
    }

    #[test]
    fn core_leaf_config() {
        struct MatchAll;
        impl PacketFilter for MatchAll {
            fn classify(&self, pkt: &Packet) -> Option<usize> {
                Some(0)
            }
        }
        assert_eq!(MatchAll.classify(&Packet::default()), Some(0));

        // Auto-provisioned internal queue.
        let mut core = QueueDiscCore::new(QueueSize::packets(10));
        assert!(core.check_leaf_config("test").is_ok());
        assert_eq!(core.queue().map(|q| q.max_size()), Some(QueueSize::packets(10)));

        // Packet filters are rejected.
        let mut core = QueueDiscCore::new(QueueSize::packets(10));
        core.filters.push(Box::new(MatchAll));
        assert!(core.check_leaf_config("test").is_err());

        // Child classes are rejected.
        let mut core = QueueDiscCore::new(QueueSize::packets(10));
        core.classes
            .push(Box::new(FifoQueueDisc::new(&QueueDiscConfig::default())));
        assert!(core.check_leaf_config("test").is_err());

        // More than one internal queue is rejected.
        let mut core = QueueDiscCore::new(QueueSize::packets(10));
        core.internal_queues
            .push(DropTailQueue::new(QueueSize::packets(10)));
        core.internal_queues
            .push(DropTailQueue::new(QueueSize::packets(10)));
        assert_eq!(
            core.check_leaf_config("test"),
            Err(Error::InvalidConfig("test needs 1 internal queue".into()))
        );
    }

    #[test]
    fn core_internal_queue_drop() {
        let now = Instant::now();
        let mut core = QueueDiscCore::new(QueueSize::packets(10));
        core.internal_queues
            .push(DropTailQueue::new(QueueSize::packets(1)));
        assert!(core.check_leaf_config("test").is_ok());
        core.set_initialized();
        core.events.enable();

        assert!(core.enqueue_internal(now, Packet::new(100, EcnCodepoint::NotEct)));
        assert!(!core.enqueue_internal(now, Packet::new(100, EcnCodepoint::NotEct)));
        assert_eq!(core.stats.enqueued_packets, 1);
        assert_eq!(
            core.stats.dropped_packets(DropReason::InternalQueueDrop),
            1
        );
        assert!(matches!(
            core.events.poll(),
            Some((
                _,
                EventData::PacketDropped {
                    reason: DropReason::InternalQueueDrop,
                    ..
                }
            ))
        ));

        let pkt = core.dequeue_internal().unwrap();
        assert_eq!(pkt.timestamp(), Some(now));
        assert_eq!(core.stats.dequeued_bytes, 100);
        assert_eq!(core.dequeue_internal(), None);
    }

    #[test]
    fn core_dispose() {
        let now = Instant::now();
        let mut core = QueueDiscCore::new(QueueSize::packets(10));
        assert!(core.check_leaf_config("test").is_ok());
        core.set_initialized();
        assert!(core.is_active());

        assert!(core.enqueue_internal(now, Packet::new(100, EcnCodepoint::NotEct)));
        assert!(core.enqueue_internal(now, Packet::new(200, EcnCodepoint::NotEct)));
        core.dispose(now);
        assert!(!core.is_active());
        assert!(core.is_disposed());
        assert_eq!(core.n_packets(), 0);
        assert_eq!(core.stats.dropped_packets(DropReason::Inactive), 2);
        assert_eq!(core.stats.dropped_bytes(DropReason::Inactive), 300);
        assert_eq!(core.stats.dropped_packets(DropReason::ForcedDrop), 0);

        // Disposing twice has no further effect.
        core.dispose(now);
        assert_eq!(core.stats.dropped_packets(DropReason::Inactive), 2);
    }
}

mod drop_tail;
mod fifo;
mod shq;
