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

//! SHQ: a Shadow-Queue-like active queue management discipline.
//!
//! SHQ counts the bytes offered during each recalculation interval, adds the
//! standing backlog, and smooths the result into `q_avg`. The mark probability
//! of the next interval is `max_p * q_avg / max_bytes`, where `max_bytes` is
//! what the link drains in one interval. Every admitted packet is marked (or
//! dropped when it cannot carry a mark) with that probability.

use std::time::Duration;
use std::time::Instant;

use log::*;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::DropReason;
use super::QueueDisc;
use super::QueueDiscConfig;
use super::QueueDiscCore;
use crate::packet::Packet;
use crate::trace::EventData;
use crate::units::DataRate;
use crate::units::QueueSize;
use crate::Error;
use crate::Result;

const NAME: &str = "SHQ";

/// SHQ configurable parameters.
#[derive(Debug, Clone)]
pub struct ShqConfig {
    /// Limit of the queue.
    max_size: QueueSize,

    /// Weight of the newest interval in the moving average.
    alpha: f64,

    /// Recalculation period.
    interval: Duration,

    /// Offset of the first recalculation from initialization.
    start_update: Duration,

    /// Bytes per queued packet in the backlog term.
    mean_pkt_size: u64,

    /// Probability reached when `q_avg` equals `max_bytes`.
    max_p: f64,

    /// Drain rate of the bottleneck.
    link_bandwidth: DataRate,

    /// Mark ECN-capable packets instead of dropping them.
    use_ecn: bool,

    /// Seed of the uniform stream.
    seed: Option<u64>,
}

impl ShqConfig {
    pub fn new(
        max_size: QueueSize,
        alpha: f64,
        interval: Duration,
        max_p: f64,
        link_bandwidth: DataRate,
        use_ecn: bool,
    ) -> Self {
        Self {
            max_size,
            alpha,
            interval,
            max_p,
            link_bandwidth,
            use_ecn,
            ..Self::default()
        }
    }

    /// Bytes the link drains during one interval.
    pub fn max_bytes(&self) -> u64 {
        self.link_bandwidth.bytes_in(self.interval)
    }

    fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "alpha {} out of (0, 1]",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.max_p) {
            return Err(Error::InvalidConfig(format!(
                "max_p {} out of [0, 1]",
                self.max_p
            )));
        }
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig("zero interval".into()));
        }
        if self.max_bytes() == 0 {
            return Err(Error::InvalidConfig(format!(
                "link {} drains nothing in {:?}",
                self.link_bandwidth, self.interval
            )));
        }
        Ok(())
    }
}

impl Default for ShqConfig {
    fn default() -> Self {
        Self::from(&QueueDiscConfig::default())
    }
}

impl From<&QueueDiscConfig> for ShqConfig {
    fn from(conf: &QueueDiscConfig) -> Self {
        Self {
            max_size: conf.max_size,
            alpha: conf.shq_alpha,
            interval: conf.shq_interval,
            start_update: conf.shq_start_update,
            mean_pkt_size: conf.mean_pkt_size,
            max_p: conf.shq_max_p,
            link_bandwidth: conf.link_bandwidth,
            use_ecn: conf.use_ecn,
            seed: conf.seed,
        }
    }
}

/// SHQ queue discipline.
pub struct Shq {
    /// Configurable parameters.
    config: ShqConfig,

    core: QueueDiscCore,

    /// Bytes offered since the last recalculation.
    count_bytes: u64,

    /// Smoothed backlog in bytes.
    q_avg: f64,

    /// Probability of acting on the next admitted packet.
    mark_prob: f64,

    /// Queueing delay of the last dequeued packet.
    q_delay: Duration,

    /// Bytes drained by the link during one interval.
    max_bytes: u64,

    /// Deadline of the pending recalculation.
    update_timer: Option<Instant>,

    rng: StdRng,
}

impl Shq {
    pub fn new(config: ShqConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            core: QueueDiscCore::new(config.max_size),
            count_bytes: 0,
            q_avg: 0.0,
            mark_prob: 0.0,
            q_delay: Duration::ZERO,
            max_bytes: config.max_bytes(),
            update_timer: None,
            rng,
            config,
        }
    }

    pub fn config(&self) -> &ShqConfig {
        &self.config
    }

    /// Smoothed backlog in bytes.
    pub fn q_avg(&self) -> f64 {
        self.q_avg
    }

    /// Current mark probability. Values above 1 act on every packet.
    pub fn mark_prob(&self) -> f64 {
        self.mark_prob
    }

    /// Bytes offered since the last recalculation.
    pub fn count_bytes(&self) -> u64 {
        self.count_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Fold the current interval into the moving average and derive the
    /// mark probability of the next one.
    pub fn recalculate_probability(&mut self, now: Instant) {
        let backlog = self.core.n_packets().saturating_mul(self.config.mean_pkt_size);
        self.count_bytes = self.count_bytes.saturating_add(backlog);
        self.q_avg =
            self.q_avg * (1.0 - self.config.alpha) + self.count_bytes as f64 * self.config.alpha;
        self.mark_prob = self.config.max_p * self.q_avg / self.max_bytes as f64;

        trace!(
            "{} recalculate count_bytes={} q_avg={} mark_prob={}",
            self.name(),
            self.count_bytes,
            self.q_avg,
            self.mark_prob
        );
        let data = EventData::ProbabilityUpdated {
            count_bytes: self.count_bytes,
            q_avg: self.q_avg,
            mark_prob: self.mark_prob,
        };
        self.events_mut().add(now, data);

        self.count_bytes = 0;
    }

    fn should_mark(&mut self) -> bool {
        let u: f64 = self.rng.gen();
        u < self.mark_prob
    }
}

impl QueueDisc for Shq {
    fn name(&self) -> &str {
        NAME
    }

    fn core(&self) -> &QueueDiscCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QueueDiscCore {
        &mut self.core
    }

    fn initialize(&mut self, now: Instant) -> Result<()> {
        self.core.check_leaf_config(NAME)?;
        if let Err(e) = self.config.validate() {
            error!("{} invalid config: {:?}", self.name(), e);
            return Err(e);
        }

        self.max_bytes = self.config.max_bytes();
        self.update_timer = Some(now + self.config.start_update);
        self.core.set_initialized();

        debug!(
            "{} initialized, limit {} max_bytes {} interval {:?}",
            self.name(),
            self.config.max_size,
            self.max_bytes,
            self.config.interval
        );
        Ok(())
    }

    fn enqueue(&mut self, now: Instant, mut pkt: Packet) -> bool {
        self.core.on_received(&pkt);

        if !self.core.is_active() {
            self.core.drop_before_enqueue(now, pkt, DropReason::Inactive);
            return false;
        }

        if self.core.would_overflow(pkt.size) {
            self.core.drop_before_enqueue(now, pkt, DropReason::ForcedDrop);
            return false;
        }

        self.count_bytes = self.count_bytes.saturating_add(pkt.size);

        if self.should_mark() {
            let marked =
                self.config.use_ecn && self.core.mark(now, &mut pkt, DropReason::UnforcedMark);
            if !marked {
                self.core
                    .drop_before_enqueue(now, pkt, DropReason::UnforcedDrop);
                return false;
            }
        }

        self.core.enqueue_internal(now, pkt)
    }

    fn dequeue(&mut self, now: Instant) -> Option<Packet> {
        let pkt = self.core.dequeue_internal()?;
        self.q_delay = match pkt.timestamp() {
            Some(t) if self.core.n_bytes() > 0 => now.saturating_duration_since(t),
            _ => Duration::ZERO,
        };
        Some(pkt)
    }

    fn timeout(&self) -> Option<Instant> {
        self.update_timer
    }

    fn on_timeout(&mut self, now: Instant) {
        while let Some(deadline) = self.update_timer {
            if deadline > now {
                break;
            }
            self.recalculate_probability(deadline);
            self.update_timer = Some(deadline + self.config.interval);
        }
    }

    fn queue_delay(&self) -> Duration {
        self.q_delay
    }

    fn dispose(&mut self, now: Instant) {
        if self.update_timer.take().is_some() {
            trace!("{} cancel recalculation timer", self.name());
        }
        self.core.dispose(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::EcnCodepoint;
    use crate::queue_disc::DropTailQueue;
    use crate::queue_disc::FifoQueueDisc;
    use crate::queue_disc::PacketFilter;

    fn new_shq(conf: &QueueDiscConfig, now: Instant) -> Shq {
        let mut q = Shq::new(ShqConfig::from(conf));
        assert_eq!(q.initialize(now), Ok(()));
        // The first recalculation is due at initialization.
        assert_eq!(q.timeout(), Some(now));
        q.on_timeout(now);
        assert_eq!(q.mark_prob(), 0.0);
        q
    }

    /// A queue whose mark probability is above 1 after one interval.
    fn saturated_shq(use_ecn: bool, now: Instant) -> Shq {
        let mut conf = QueueDiscConfig::default();
        conf.set_max_size(QueueSize::packets(2));
        conf.set_shq_alpha(1.0);
        conf.set_shq_max_p(1.0);
        conf.set_shq_interval(10);
        conf.set_link_bandwidth(DataRate::from_mbps(1));
        conf.enable_ecn(use_ecn);
        conf.set_seed(7);

        let mut q = new_shq(&conf, now);
        assert_eq!(q.max_bytes(), 1250);
        assert!(q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0)));
        assert!(q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0)));

        // 2000 offered bytes plus 2 queued packets of 1000 bytes.
        q.on_timeout(now + Duration::from_millis(10));
        assert_eq!(q.q_avg(), 4000.0);
        assert_eq!(q.mark_prob(), 3.2);
        q
    }

    #[test]
    fn shq_config() {
        let conf = ShqConfig::default();
        assert_eq!(conf.alpha, 0.25);
        assert_eq!(conf.interval, Duration::from_millis(15));
        assert_eq!(conf.max_p, 0.9);
        assert_eq!(conf.mean_pkt_size, 1000);
        assert_eq!(conf.max_size, QueueSize::packets(100));
        assert!(conf.use_ecn);
        assert_eq!(conf.max_bytes(), 187500);

        let conf = ShqConfig::new(
            QueueSize::packets(10),
            0.5,
            Duration::from_millis(20),
            0.5,
            DataRate::from_mbps(10),
            false,
        );
        assert_eq!(conf.max_bytes(), 25000);
        assert!(!conf.use_ecn);
        assert_eq!(conf.start_update, Duration::ZERO);
    }

    #[test]
    fn shq_invalid_config() {
        let now = Instant::now();
        let cases: [fn(&mut QueueDiscConfig); 6] = [
            |c| c.set_shq_alpha(0.0),
            |c| c.set_shq_alpha(1.5),
            |c| c.set_shq_max_p(-0.1),
            |c| c.set_shq_max_p(1.1),
            |c| c.set_shq_interval(0),
            |c| c.set_link_bandwidth(DataRate::from_bps(0)),
        ];

        for case in cases {
            let mut conf = QueueDiscConfig::default();
            case(&mut conf);
            let mut q = Shq::new(ShqConfig::from(&conf));
            assert!(matches!(q.initialize(now), Err(Error::InvalidConfig(_))));
            assert_eq!(q.timeout(), None);
            assert!(!q.enqueue(now, Packet::new(100, EcnCodepoint::Ect0)));
        }
    }

    #[test]
    fn shq_check_config() {
        struct FlowFilter;
        impl PacketFilter for FlowFilter {
            fn classify(&self, pkt: &Packet) -> Option<usize> {
                Some(pkt.flow_id as usize)
            }
        }

        let now = Instant::now();
        let conf = QueueDiscConfig::default();

        let mut q = Shq::new(ShqConfig::from(&conf));
        q.add_class(Box::new(FifoQueueDisc::new(&conf)));
        assert!(matches!(q.initialize(now), Err(Error::InvalidConfig(_))));

        let mut q = Shq::new(ShqConfig::from(&conf));
        q.add_packet_filter(Box::new(FlowFilter));
        assert!(matches!(q.initialize(now), Err(Error::InvalidConfig(_))));

        let mut q = Shq::new(ShqConfig::from(&conf));
        q.add_internal_queue(DropTailQueue::new(QueueSize::packets(10)));
        q.add_internal_queue(DropTailQueue::new(QueueSize::packets(10)));
        assert!(matches!(q.initialize(now), Err(Error::InvalidConfig(_))));

        // A supplied internal queue is used as is.
        let mut q = Shq::new(ShqConfig::from(&conf));
        q.add_internal_queue(DropTailQueue::new(QueueSize::packets(1)));
        assert_eq!(q.initialize(now), Ok(()));
        assert!(q.enqueue(now, Packet::new(100, EcnCodepoint::Ect0)));
        assert!(!q.enqueue(now, Packet::new(100, EcnCodepoint::Ect0)));
        assert_eq!(q.stats().dropped_packets(DropReason::InternalQueueDrop), 1);
    }

    #[test]
    fn shq_probability_formula() {
        let now = Instant::now();
        let mut q = new_shq(&QueueDiscConfig::default(), now);
        assert_eq!(q.max_bytes(), 187500);

        for _ in 0..3 {
            assert!(q.enqueue(now, Packet::new(1500, EcnCodepoint::Ect1)));
        }
        assert_eq!(q.count_bytes(), 4500);

        // 4500 offered bytes plus 3 queued packets of mean size.
        q.on_timeout(now + Duration::from_millis(15));
        assert_eq!(q.count_bytes(), 0);
        assert!((q.q_avg() - 1875.0).abs() < 1e-9);
        assert!((q.mark_prob() - 0.9 * 1875.0 / 187500.0).abs() < 1e-12);
        assert_eq!(q.timeout(), Some(now + Duration::from_millis(30)));

        // Standing backlog alone keeps feeding the average.
        q.on_timeout(now + Duration::from_millis(30));
        let q_avg = 1875.0 * 0.75 + 3000.0 * 0.25;
        assert!((q.q_avg() - q_avg).abs() < 1e-9);
        assert!((q.mark_prob() - 0.9 * q_avg / 187500.0).abs() < 1e-12);
    }

    #[test]
    fn shq_converge() {
        let now = Instant::now();
        let interval = Duration::from_millis(20);
        let mut conf = QueueDiscConfig::default();
        conf.set_shq_alpha(0.25);
        conf.set_shq_max_p(0.5);
        conf.set_shq_interval(20);
        conf.set_mean_pkt_size(1000);
        conf.set_link_bandwidth(DataRate::from_mbps(10));
        conf.set_seed(1);

        let mut q = new_shq(&conf, now);
        assert_eq!(q.max_bytes(), 25000);

        let mut expected = 0.0;
        let mut last = 0.0;
        for i in 1..=30u32 {
            // Fill one interval worth of bytes and let the link drain it.
            let t = now + interval * i - interval / 2;
            for seq in 0..25 {
                let pkt = Packet::new(1000, EcnCodepoint::Ect0).with_flow(0, seq);
                assert!(q.enqueue(t, pkt));
            }
            while q.dequeue(t).is_some() {}

            q.on_timeout(now + interval * i);
            expected = expected * 0.75 + 25000.0 * 0.25;
            assert!((q.q_avg() - expected).abs() < 1e-6);
            assert!(q.q_avg() > last);
            assert!((q.mark_prob() - 0.5 * q.q_avg() / 25000.0).abs() < 1e-12);
            last = q.q_avg();
        }

        // Geometric convergence at rate 0.75.
        assert!(25000.0 - q.q_avg() <= 25000.0 * 0.75f64.powi(30) + 1e-6);
        assert!(q.mark_prob() < 0.5);
        assert!(q.mark_prob() > 0.499);
        assert_eq!(q.stats().total_dropped_packets(), 0);
        assert!(q.stats().marked_packets(DropReason::UnforcedMark) > 0);
    }

    #[test]
    fn shq_decay() {
        let now = Instant::now();
        let interval = Duration::from_millis(15);
        let mut q = new_shq(&QueueDiscConfig::default(), now);

        for _ in 0..50 {
            q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0));
        }
        while q.dequeue(now).is_some() {}
        q.on_timeout(now + interval);
        assert!(q.q_avg() > 0.0);

        let mut last = q.q_avg();
        for i in 2..40u32 {
            q.on_timeout(now + interval * i);
            assert!(q.q_avg() < last);
            assert!(q.q_avg() >= 0.0);
            assert!(q.mark_prob() >= 0.0);
            last = q.q_avg();
        }
    }

    #[test]
    fn shq_huge_mean_pkt_size() {
        let now = Instant::now();
        let mut conf = QueueDiscConfig::default();
        conf.set_mean_pkt_size(u64::MAX);
        let mut q = new_shq(&conf, now);

        for _ in 0..3 {
            q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0));
        }
        q.recalculate_probability(now);
        assert_eq!(q.count_bytes(), 0);
        assert!(q.q_avg() > 0.0);
        assert!(q.mark_prob() > 1.0);
    }

    #[test]
    fn shq_missed_ticks() {
        let now = Instant::now();
        let mut conf = QueueDiscConfig::default();
        conf.set_shq_start_update(5);

        let mut q = Shq::new(ShqConfig::from(&conf));
        q.enable_events();
        q.initialize(now).unwrap();
        assert_eq!(q.timeout(), Some(now + Duration::from_millis(5)));

        q.on_timeout(now + Duration::from_millis(4));
        assert!(q.poll_event().is_none());

        // Ticks at 5, 20, 35 and 50 ms.
        q.on_timeout(now + Duration::from_millis(51));
        let mut ticks = Vec::new();
        while let Some((t, data)) = q.poll_event() {
            assert!(matches!(data, EventData::ProbabilityUpdated { .. }));
            ticks.push(t.duration_since(now).as_millis());
        }
        assert_eq!(ticks, vec![5, 20, 35, 50]);
        assert_eq!(q.timeout(), Some(now + Duration::from_millis(65)));
    }

    #[test]
    fn shq_forced_drop() {
        let now = Instant::now();
        let mut q = saturated_shq(true, now);

        // The queue is full; the probability is never consulted.
        for seq in 0..10 {
            let pkt = Packet::new(1000, EcnCodepoint::Ect0).with_flow(1, seq);
            assert!(!q.enqueue(now, pkt));
        }
        assert_eq!(q.n_packets(), 2);
        assert_eq!(q.count_bytes(), 0);
        assert_eq!(q.stats().dropped_packets(DropReason::ForcedDrop), 10);
        assert_eq!(q.stats().dropped_bytes(DropReason::ForcedDrop), 10000);
        assert_eq!(q.stats().dropped_packets(DropReason::UnforcedDrop), 0);
        assert_eq!(q.stats().total_marked_packets(), 0);
    }

    #[test]
    fn shq_mark() {
        let now = Instant::now();
        let mut q = saturated_shq(true, now);
        q.enable_events();

        q.dequeue(now);
        assert!(q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect1).with_flow(3, 9)));
        assert_eq!(q.count_bytes(), 1000);
        assert_eq!(q.stats().marked_packets(DropReason::UnforcedMark), 1);
        assert_eq!(
            q.poll_event().map(|(_, e)| e),
            Some(EventData::PacketMarked {
                flow_id: 3,
                seq: 9,
                size: 1000,
                reason: DropReason::UnforcedMark,
            })
        );

        q.dequeue(now);
        let pkt = q.dequeue(now).unwrap();
        assert!(pkt.is_ce());
        assert_eq!(pkt.flow_id, 3);

        // Packets of transports that did not opt into ECN are dropped.
        assert!(!q.enqueue(now, Packet::new(500, EcnCodepoint::NotEct)));
        assert_eq!(q.count_bytes(), 1500);
        assert_eq!(q.stats().dropped_packets(DropReason::UnforcedDrop), 1);
        assert_eq!(q.stats().dropped_bytes(DropReason::UnforcedDrop), 500);
        assert_eq!(q.n_packets(), 0);
    }

    #[test]
    fn shq_ecn_disabled() {
        let now = Instant::now();
        let mut q = saturated_shq(false, now);

        q.dequeue(now);
        assert!(!q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0)));
        assert!(!q.enqueue(now, Packet::new(1000, EcnCodepoint::Ce)));
        assert_eq!(q.stats().dropped_packets(DropReason::UnforcedDrop), 2);
        assert_eq!(q.stats().total_marked_packets(), 0);
        assert_eq!(q.n_packets(), 1);
    }

    #[test]
    fn shq_queue_delay() {
        let now = Instant::now();
        let mut q = new_shq(&QueueDiscConfig::default(), now);
        assert_eq!(q.dequeue(now), None);
        assert_eq!(q.queue_delay(), Duration::ZERO);

        q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0));
        q.enqueue(now + Duration::from_millis(1), Packet::new(1000, EcnCodepoint::Ect0));

        let t = now + Duration::from_millis(3);
        let pkt = q.dequeue(t).unwrap();
        assert_eq!(pkt.timestamp(), Some(now));
        assert_eq!(q.queue_delay(), Duration::from_millis(3));

        let sample = q.sample(t);
        assert_eq!(sample.packets, 1);
        assert_eq!(sample.bytes, 1000);
        assert_eq!(sample.delay, Duration::from_millis(3));

        // Dequeuing the last packet resets the delay.
        q.dequeue(t);
        assert_eq!(q.queue_delay(), Duration::ZERO);
    }

    #[test]
    fn shq_byte_limit() {
        let now = Instant::now();
        let mut conf = QueueDiscConfig::default();
        conf.set_max_size(QueueSize::bytes(2500));
        conf.set_seed(3);
        let mut q = new_shq(&conf, now);

        let interval = Duration::from_millis(15);
        for i in 0..200u32 {
            let t = now + Duration::from_micros(500) * i;
            q.on_timeout(t);
            let size = 200 + (i as u64 * 373) % 1300;
            q.enqueue(t, Packet::new(size, EcnCodepoint::Ect0));
            assert!(q.n_bytes() <= 2500);
            if i % 3 == 0 {
                q.dequeue(t);
            }
        }
        assert!(q.stats().dropped_packets(DropReason::ForcedDrop) > 0);
        assert!(q.timeout().unwrap() > now + interval * 6);
    }

    #[test]
    fn shq_seeded() {
        let now = Instant::now();
        let mut conf = QueueDiscConfig::default();
        conf.set_max_size(QueueSize::packets(1000));
        conf.set_shq_alpha(1.0);
        conf.set_shq_max_p(1.0);
        conf.set_shq_interval(10);
        conf.set_link_bandwidth(DataRate::from_mbps(1));
        conf.set_seed(2023);

        let run = |conf: &QueueDiscConfig| {
            let mut q = new_shq(conf, now);
            assert!(q.enqueue(now, Packet::new(625, EcnCodepoint::NotEct)));
            q.dequeue(now);
            q.on_timeout(now + Duration::from_millis(10));
            assert_eq!(q.mark_prob(), 0.5);

            (0..200)
                .map(|_| {
                    let admitted = q.enqueue(now, Packet::new(100, EcnCodepoint::NotEct));
                    q.dequeue(now);
                    admitted
                })
                .collect::<Vec<bool>>()
        };

        let a = run(&conf);
        let b = run(&conf);
        assert_eq!(a, b);
        assert!(a.iter().any(|v| *v));
        assert!(a.iter().any(|v| !*v));
    }

    #[test]
    fn shq_dispose() {
        let now = Instant::now();
        let mut q = new_shq(&QueueDiscConfig::default(), now);
        q.enable_events();

        q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0));
        q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0));
        assert!(q.timeout().is_some());

        q.dispose(now);
        assert_eq!(q.timeout(), None);
        assert_eq!(q.n_packets(), 0);
        assert_eq!(q.stats().dropped_packets(DropReason::Inactive), 2);
        while q.poll_event().is_some() {}

        // A late tick is never executed.
        q.on_timeout(now + Duration::from_secs(1));
        assert_eq!(q.q_avg(), 0.0);
        assert!(q.poll_event().is_none());

        assert!(!q.enqueue(now, Packet::new(1000, EcnCodepoint::Ect0)));
        assert_eq!(q.stats().dropped_packets(DropReason::Inactive), 3);
        assert_eq!(q.stats().dropped_packets(DropReason::ForcedDrop), 0);

        q.dispose(now);
        assert_eq!(q.stats().dropped_packets(DropReason::Inactive), 3);
    }
}
