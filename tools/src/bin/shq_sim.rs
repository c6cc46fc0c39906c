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

use std::fs::File;
use std::io::BufWriter;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use log::error;
use statrs::statistics::Data;
use statrs::statistics::Distribution;
use statrs::statistics::Max;
use statrs::statistics::Min;
use statrs::statistics::OrderStatistics;
use strum::IntoEnumIterator;

use shq::trace::EventImportance;
use shq::trace::TraceWriter;
use shq::CongestionControlConfig;
use shq::DataRate;
use shq::DropReason;
use shq::QueueDiscConfig;
use shq::QueueSize;
use shq_tools::Result;
use shq_tools::SimConfig;
use shq_tools::SimReport;
use shq_tools::Simulator;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Parser, Debug, Clone)]
#[clap(name = "shq_sim")]
pub struct SimOpt {
    /// Number of competing flows.
    #[clap(short, long, default_value = "2", value_name = "NUM")]
    pub flows: usize,

    /// Queue discipline of the bottleneck, support FIFO/SHQ.
    #[clap(long, default_value = "SHQ", value_name = "STR")]
    pub qdisc: String,

    /// Congestion control algorithm of the senders, support RENO/LGC.
    #[clap(long, default_value = "LGC", value_name = "STR")]
    pub congestion_control_algor: String,

    /// Bottleneck bandwidth, e.g. "100Mbps".
    #[clap(long, default_value = "100Mbps", value_name = "RATE")]
    pub bandwidth: DataRate,

    /// Bottleneck queue limit, in packets ("100p") or bytes ("150000B").
    #[clap(long, default_value = "100p", value_name = "SIZE")]
    pub queue_size: QueueSize,

    /// Round trip propagation delay in milliseconds.
    #[clap(long, default_value = "20", value_name = "TIME")]
    pub rtt: u64,

    /// Simulated duration in seconds.
    #[clap(short, long, default_value = "10", value_name = "TIME")]
    pub duration: u64,

    /// Flows start at a random offset up to this value, in milliseconds.
    #[clap(long, default_value = "0", value_name = "TIME")]
    pub start_spread: u64,

    /// Period of queue samples in milliseconds.
    #[clap(long, default_value = "10", value_name = "TIME")]
    pub sample_interval: u64,

    /// SHQ smoothing factor.
    #[clap(long, default_value = "0.25", value_name = "NUM")]
    pub shq_alpha: f64,

    /// SHQ recalculation interval in milliseconds.
    #[clap(long, default_value = "15", value_name = "TIME")]
    pub shq_interval: u64,

    /// Delay of the first SHQ recalculation in milliseconds.
    #[clap(long, default_value = "0", value_name = "TIME")]
    pub shq_start_update: u64,

    /// SHQ maximum mark probability.
    #[clap(long, default_value = "0.9", value_name = "NUM")]
    pub shq_max_p: f64,

    /// Mean packet size in bytes used by SHQ for the standing backlog.
    #[clap(long, default_value = "1000", value_name = "NUM")]
    pub mean_pkt_size: u64,

    /// Drop instead of mark.
    #[clap(long)]
    pub disable_ecn: bool,

    /// Sender maximum segment size in bytes.
    #[clap(long, default_value = "1448", value_name = "NUM")]
    pub segment_size: u64,

    /// Initial congestion window in packets.
    #[clap(long, default_value = "10", value_name = "NUM")]
    pub initial_congestion_window: u64,

    /// LGC estimator gain.
    #[clap(long, default_value = "0.0625", value_name = "NUM")]
    pub lgc_g: f64,

    /// LGC initial congestion estimate.
    #[clap(long, default_value = "1.0", value_name = "NUM")]
    pub lgc_initial_alpha: f64,

    /// Use ECT(0) instead of ECT(1) for LGC packets.
    #[clap(long)]
    pub lgc_use_ect0: bool,

    /// Seed of random streams.
    #[clap(long, default_value = "1", value_name = "NUM")]
    pub seed: u64,

    /// Save trace events to the file, as JSON text sequences.
    #[clap(long, value_name = "FILE")]
    pub trace_file: Option<String>,

    /// Level of trace events, support CORE/BASE/EXTRA.
    #[clap(long, default_value = "BASE", value_name = "STR")]
    pub trace_level: String,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,
}

impl SimOpt {
    fn sim_config(&self) -> SimConfig {
        let mut queue = QueueDiscConfig::default();
        queue.set_max_size(self.queue_size);
        queue.set_link_bandwidth(self.bandwidth);
        queue.set_shq_alpha(self.shq_alpha);
        queue.set_shq_interval(self.shq_interval);
        queue.set_shq_start_update(self.shq_start_update);
        queue.set_shq_max_p(self.shq_max_p);
        queue.set_mean_pkt_size(self.mean_pkt_size);
        queue.enable_ecn(!self.disable_ecn);
        queue.set_seed(self.seed);

        let mut congestion = CongestionControlConfig::default();
        congestion.set_segment_size(self.segment_size);
        congestion.set_initial_congestion_window(self.initial_congestion_window);
        congestion.set_lgc_g(self.lgc_g);
        congestion.set_lgc_initial_alpha(self.lgc_initial_alpha);
        congestion.set_lgc_use_ect0(self.lgc_use_ect0);

        SimConfig {
            flows: self.flows,
            qdisc: self.qdisc.clone(),
            cc: self.congestion_control_algor.clone(),
            queue,
            congestion,
            rtt: Duration::from_millis(self.rtt),
            duration: Duration::from_secs(self.duration),
            sample_interval: Duration::from_millis(self.sample_interval),
            start_spread: Duration::from_millis(self.start_spread),
            seed: self.seed,
        }
    }

    fn trace_writer(&self, start: Instant) -> Result<Option<TraceWriter>> {
        let path = match &self.trace_file {
            Some(path) => path,
            None => return Ok(None),
        };

        let level = if self.trace_level.eq_ignore_ascii_case("core") {
            EventImportance::Core
        } else if self.trace_level.eq_ignore_ascii_case("base") {
            EventImportance::Base
        } else if self.trace_level.eq_ignore_ascii_case("extra") {
            EventImportance::Extra
        } else {
            return Err(format!("unknown trace level {}", self.trace_level).into());
        };

        let file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                error!("create trace file {} error: {:?}", path, e);
                return Err(Box::new(e));
            }
        };

        Ok(Some(TraceWriter::new(
            Some(format!(
                "{} flows of {} over {}",
                self.flows, self.congestion_control_algor, self.qdisc
            )),
            None,
            level,
            Box::new(BufWriter::new(file)),
            start,
        )))
    }
}

fn print_report(report: &SimReport) {
    println!();
    println!(
        "simulated {:?} through {}, fairness {:.4}",
        report.duration,
        report.qdisc,
        report.fairness()
    );

    for flow in &report.flows {
        let alpha = match flow.alpha {
            Some(alpha) => format!("{:.4}", alpha),
            None => "-".to_string(),
        };
        println!(
            "flow {}: goodput {:.2} Mbps, delivered {} bytes, lost {} bytes, cwnd {}, \
             alpha {}, congestion events {}",
            flow.id,
            flow.goodput_mbps,
            flow.delivered_bytes,
            flow.lost_bytes,
            flow.cwnd,
            alpha,
            flow.congestion_events,
        );
    }

    if !report.delay_samples.is_empty() {
        let mut s = Data::new(report.delay_samples.clone());
        println!("queueing delay(µs):");
        println!(
            "\tmin: {:.2}, max: {:.2}, mean: {:.2}, sd: {:.2}",
            s.min(),
            s.max(),
            s.mean().unwrap_or_default(),
            s.std_dev().unwrap_or_default(),
        );
        println!(
            "\tmedian: {:.2}, p80: {:.2}, p90: {:.2}, p99: {:.2}",
            s.median(),
            s.percentile(80),
            s.percentile(90),
            s.percentile(99),
        );

        let q = Data::new(report.queue_samples.clone());
        println!(
            "queue length(pkts): mean {:.2}, max {:.0}",
            q.mean().unwrap_or_default(),
            q.max()
        );
    }

    let stats = &report.queue;
    println!(
        "queue: received {}, enqueued {}, dequeued {}",
        stats.received_packets, stats.enqueued_packets, stats.dequeued_packets
    );
    for reason in DropReason::iter() {
        let dropped = stats.dropped_packets(reason);
        let marked = stats.marked_packets(reason);
        if dropped > 0 || marked > 0 {
            println!("\t{}: dropped {}, marked {}", reason, dropped, marked);
        }
    }
    println!();
}

fn main() -> Result<()> {
    let option = SimOpt::parse();

    env_logger::builder()
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    let start = Instant::now();
    let trace = option.trace_writer(start)?;
    let simulator = Simulator::new(option.sim_config(), start, trace)?;
    let report = simulator.run()?;
    print_report(&report);

    Ok(())
}
