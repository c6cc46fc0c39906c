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

//! A discrete-event dumbbell: window-limited senders share one bottleneck
//! queue discipline, and every delivered packet is acknowledged after a fixed
//! propagation delay with its CE mark echoed as ECE.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::info;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use shq::error::Error;
use shq::trace::Event;
use shq::trace::TraceWriter;
use shq::CongestionControlConfig;
use shq::CongestionControlRegistry;
use shq::CongestionController;
use shq::Packet;
use shq::QueueDisc;
use shq::QueueDiscConfig;
use shq::QueueDiscRegistry;
use shq::QueueDiscStats;
use shq::Scheduler;
use shq::TransportState;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Settings of a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of senders.
    pub flows: usize,

    /// Queue discipline of the bottleneck.
    pub qdisc: String,

    /// Congestion control algorithm of every sender.
    pub cc: String,

    pub queue: QueueDiscConfig,

    pub congestion: CongestionControlConfig,

    /// Round trip propagation delay.
    pub rtt: Duration,

    /// Simulated duration.
    pub duration: Duration,

    /// Period of the queue samples.
    pub sample_interval: Duration,

    /// Senders start at a random offset in [0, start_spread].
    pub start_spread: Duration,

    /// Seed of the start offsets.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            flows: 2,
            qdisc: "shq".into(),
            cc: "lgc".into(),
            queue: QueueDiscConfig::default(),
            congestion: CongestionControlConfig::default(),
            rtt: Duration::from_millis(20),
            duration: Duration::from_secs(10),
            sample_interval: Duration::from_millis(10),
            start_spread: Duration::ZERO,
            seed: 1,
        }
    }
}

impl SimConfig {
    /// Reject settings that would stall or overflow the event loop.
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(Error::InvalidConfig("zero duration".into()).into());
        }
        if self.sample_interval.is_zero() {
            return Err(Error::InvalidConfig("zero sample interval".into()).into());
        }
        if self.queue.link_bandwidth.bit_rate() == 0 {
            return Err(Error::InvalidConfig("zero link bandwidth".into()).into());
        }
        Ok(())
    }
}

enum SimEvent {
    /// A sender starts transmitting.
    FlowStart(usize),

    /// The packet on the wire has been serialized.
    TxDone,

    /// An acknowledgment reaches its sender.
    Ack { flow: usize, ack_seq: u64, ece: bool },

    /// A sender learns that a packet was dropped.
    Loss { flow: usize, end_seq: u64, size: u64 },

    /// Poll the bottleneck occupancy.
    Sample,
}

struct Flow {
    cc: Box<dyn CongestionController>,

    tcb: TransportState,

    /// Send pointer at the last window reduction.
    recover_seq: u64,

    /// Dropped ranges not yet covered by a cumulative acknowledgment.
    holes: VecDeque<(u64, u64)>,

    delivered_bytes: u64,

    lost_bytes: u64,
}

/// Outcome of one sender.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub id: usize,

    pub delivered_bytes: u64,

    pub lost_bytes: u64,

    /// Delivered bits per second, in Mbps.
    pub goodput_mbps: f64,

    /// Congestion window at the end of the run.
    pub cwnd: u64,

    /// Congestion estimate at the end of the run.
    pub alpha: Option<f64>,

    pub congestion_events: u64,

    pub estimation_windows: u64,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone)]
pub struct SimReport {
    pub duration: Duration,

    /// Name of the bottleneck discipline.
    pub qdisc: String,

    pub queue: QueueDiscStats,

    /// Queueing delay samples in microseconds.
    pub delay_samples: Vec<f64>,

    /// Queue length samples in packets.
    pub queue_samples: Vec<f64>,

    pub flows: Vec<FlowReport>,
}

impl SimReport {
    /// Jain's fairness index of the flow goodputs.
    pub fn fairness(&self) -> f64 {
        let sum: f64 = self.flows.iter().map(|f| f.goodput_mbps).sum();
        let sum_sq: f64 = self.flows.iter().map(|f| f.goodput_mbps.powi(2)).sum();
        if sum_sq == 0.0 {
            return 0.0;
        }
        sum * sum / (self.flows.len() as f64 * sum_sq)
    }

    /// Total delivered bytes.
    pub fn delivered_bytes(&self) -> u64 {
        self.flows.iter().map(|f| f.delivered_bytes).sum()
    }
}

/// A dumbbell with one bottleneck link.
pub struct Simulator {
    conf: SimConfig,

    start: Instant,

    sched: Scheduler<SimEvent>,

    qdisc: Box<dyn QueueDisc>,

    flows: Vec<Flow>,

    /// The packet being serialized onto the bottleneck link.
    on_wire: Option<Packet>,

    delay_samples: Vec<f64>,

    queue_samples: Vec<f64>,

    trace: Option<TraceWriter>,
}

impl Simulator {
    /// Build the topology. Trace events are written to `trace` if given.
    pub fn new(conf: SimConfig, start: Instant, trace: Option<TraceWriter>) -> Result<Self> {
        conf.validate()?;

        let mut qdisc = QueueDiscRegistry::with_builtin().build(&conf.qdisc, &conf.queue)?;
        qdisc.initialize(start)?;

        let registry = CongestionControlRegistry::with_builtin();
        let mut rng = StdRng::seed_from_u64(conf.seed);
        let mut sched = Scheduler::new();
        let mut flows = Vec::with_capacity(conf.flows);
        for i in 0..conf.flows {
            let mut cc = registry.build(&conf.cc, &conf.congestion)?;
            let mut tcb = TransportState::new(
                conf.congestion.segment_size,
                conf.congestion.initial_window(),
            );
            cc.on_init(&mut tcb);

            let spread = conf.start_spread.as_micros() as u64;
            let offset = match spread {
                0 => Duration::ZERO,
                _ => Duration::from_micros(rng.gen_range(0..=spread)),
            };
            sched.schedule(start, offset, SimEvent::FlowStart(i));
            debug!("flow {} {} starts at {:?}", i, cc.name(), offset);

            flows.push(Flow {
                cc,
                tcb,
                recover_seq: 0,
                holes: VecDeque::new(),
                delivered_bytes: 0,
                lost_bytes: 0,
            });
        }
        sched.schedule_at(start, SimEvent::Sample);

        let mut trace = trace;
        if let Some(writer) = trace.as_mut() {
            writer.start()?;
            qdisc.enable_events();
            for flow in flows.iter_mut() {
                flow.cc.enable_events();
            }
        }

        Ok(Self {
            conf,
            start,
            sched,
            qdisc,
            flows,
            on_wire: None,
            delay_samples: Vec::new(),
            queue_samples: Vec::new(),
            trace,
        })
    }

    /// Run until the configured duration elapses.
    pub fn run(mut self) -> Result<SimReport> {
        let end = self.start + self.conf.duration;

        loop {
            let next = match (self.sched.next_timeout(), self.qdisc.timeout()) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => break,
            };
            if next > end {
                break;
            }

            if self.qdisc.timeout().map_or(false, |t| t <= next) {
                self.qdisc.on_timeout(next);
            }
            while let Some((_, _, event)) = self.sched.next_expire(next) {
                self.process(next, event);
            }
            self.flush_trace()?;
        }

        self.qdisc.dispose(end);
        self.flush_trace()?;
        if let Some(writer) = self.trace.as_mut() {
            writer.flush()?;
        }

        info!(
            "simulation done, {} flows, {} packets dequeued",
            self.flows.len(),
            self.qdisc.stats().dequeued_packets
        );
        Ok(self.report())
    }

    fn process(&mut self, now: Instant, event: SimEvent) {
        match event {
            SimEvent::FlowStart(flow) => self.try_send(now, flow),

            SimEvent::TxDone => {
                if let Some(pkt) = self.on_wire.take() {
                    let ack = SimEvent::Ack {
                        flow: pkt.flow_id as usize,
                        ack_seq: pkt.seq + pkt.size,
                        ece: pkt.is_ce(),
                    };
                    self.sched.schedule(now, self.conf.rtt, ack);
                }
                self.start_tx(now);
            }

            SimEvent::Ack { flow, ack_seq, ece } => {
                self.on_ack(now, flow, ack_seq, ece);
                self.try_send(now, flow);
            }

            SimEvent::Loss {
                flow,
                end_seq,
                size,
            } => {
                self.on_loss(now, flow, end_seq, size);
                self.try_send(now, flow);
            }

            SimEvent::Sample => {
                let sample = self.qdisc.sample(now);
                self.delay_samples.push(sample.delay.as_micros() as f64);
                self.queue_samples.push(sample.packets as f64);
                self.sched
                    .schedule(now, self.conf.sample_interval, SimEvent::Sample);
            }
        }
    }

    /// Send while the congestion window allows.
    fn try_send(&mut self, now: Instant, id: usize) {
        let flow = &mut self.flows[id];
        let seg = flow.tcb.segment_size;

        while flow.tcb.can_send(seg) {
            let pkt = Packet::new(seg, flow.tcb.outgoing_ecn())
                .with_flow(id as u64, flow.tcb.next_tx_seq);
            flow.tcb.on_sent(seg);

            let end_seq = pkt.seq + pkt.size;
            if !self.qdisc.enqueue(now, pkt) {
                let loss = SimEvent::Loss {
                    flow: id,
                    end_seq,
                    size: seg,
                };
                self.sched.schedule(now, self.conf.rtt, loss);
            }
        }

        self.start_tx(now);
    }

    /// Put the next packet on the wire if the link is idle.
    fn start_tx(&mut self, now: Instant) {
        if self.on_wire.is_some() {
            return;
        }
        if let Some(pkt) = self.qdisc.dequeue(now) {
            let tx_time = self.conf.queue.link_bandwidth.transmission_time(pkt.size);
            self.on_wire = Some(pkt);
            self.sched.schedule(now, tx_time, SimEvent::TxDone);
        }
    }

    fn on_ack(&mut self, now: Instant, id: usize, ack_seq: u64, ece: bool) {
        let flow = &mut self.flows[id];

        // The cumulative acknowledgment also covers dropped ranges whose bytes
        // already left the flight.
        let mut covered = 0;
        while let Some(&(end, size)) = flow.holes.front() {
            if end > ack_seq {
                break;
            }
            flow.holes.pop_front();
            covered += size;
        }
        flow.tcb.bytes_in_flight += covered;

        let acked = flow.tcb.on_ack_received(ack_seq, ece).saturating_sub(covered);
        flow.delivered_bytes += acked;

        let segments = acked / flow.tcb.segment_size;
        flow.cc.on_ack(now, &flow.tcb, segments, self.conf.rtt);
        if ece && flow.tcb.last_acked_seq >= flow.recover_seq {
            flow.cc.on_congestion_event(now, &mut flow.tcb);
            flow.recover_seq = flow.tcb.next_tx_seq;
        } else {
            flow.cc.increase_window(&mut flow.tcb, segments);
        }
    }

    fn on_loss(&mut self, now: Instant, id: usize, end_seq: u64, size: u64) {
        let flow = &mut self.flows[id];
        if end_seq <= flow.tcb.last_acked_seq {
            return;
        }

        flow.tcb.on_lost(size);
        flow.lost_bytes += size;
        flow.holes.push_back((end_seq, size));
        if flow.tcb.last_acked_seq >= flow.recover_seq {
            flow.cc.on_congestion_event(now, &mut flow.tcb);
            flow.recover_seq = flow.tcb.next_tx_seq;
        }
    }

    fn flush_trace(&mut self) -> Result<()> {
        let writer = match self.trace.as_mut() {
            Some(writer) => writer,
            None => return Ok(()),
        };

        writer.drain(self.qdisc.events_mut(), "bottleneck")?;
        for (i, flow) in self.flows.iter_mut().enumerate() {
            while let Some((time, data)) = flow.cc.poll_event() {
                let mut event = Event::new(writer.relative_time(time), data);
                event.group_id = Some(format!("flow-{}", i));
                match writer.add_event(event) {
                    Ok(()) | Err(Error::Done) => (),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    fn report(&self) -> SimReport {
        let secs = self.conf.duration.as_secs_f64();
        let flows = self
            .flows
            .iter()
            .enumerate()
            .map(|(id, flow)| FlowReport {
                id,
                delivered_bytes: flow.delivered_bytes,
                lost_bytes: flow.lost_bytes,
                goodput_mbps: match secs {
                    s if s > 0.0 => flow.delivered_bytes as f64 * 8.0 / s / 1e6,
                    _ => 0.0,
                },
                cwnd: flow.tcb.cwnd,
                alpha: flow.cc.alpha(),
                congestion_events: flow.cc.stats().congestion_events,
                estimation_windows: flow.cc.stats().estimation_windows,
            })
            .collect();

        SimReport {
            duration: self.conf.duration,
            qdisc: self.qdisc.name().to_string(),
            queue: self.qdisc.stats().clone(),
            delay_samples: self.delay_samples.clone(),
            queue_samples: self.queue_samples.clone(),
            flows,
        }
    }
}
