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

use std::time::Duration;
use std::time::Instant;

use log::*;

use super::CongestionControlConfig;
use super::CongestionController;
use super::CongestionStats;
use super::TransportState;

/// Reno configurable parameters.
#[derive(Debug, Clone)]
pub struct RenoConfig {
    /// Minimal congestion window in bytes.
    min_cwnd: u64,

    /// Sender maximum segment size in bytes.
    segment_size: u64,
}

impl RenoConfig {
    pub fn new(min_cwnd: u64, segment_size: u64) -> Self {
        Self {
            min_cwnd,
            segment_size,
        }
    }
}

impl From<&CongestionControlConfig> for RenoConfig {
    fn from(conf: &CongestionControlConfig) -> Self {
        Self::new(conf.minimal_window(), conf.segment_size)
    }
}

/// Reno congestion control: one segment per acknowledged segment in slow
/// start, one segment per window in congestion avoidance, and halving on
/// congestion.
#[derive(Debug)]
pub struct Reno {
    config: RenoConfig,

    /// Segments acknowledged since the last congestion avoidance increase.
    cwnd_cnt: u64,

    stats: CongestionStats,
}

impl Reno {
    pub fn new(config: RenoConfig) -> Self {
        Self {
            config,
            cwnd_cnt: 0,
            stats: Default::default(),
        }
    }

    /// Grow the window by one segment per acknowledged segment, up to
    /// ssthresh. Return the acknowledged segments left over.
    fn slow_start(&mut self, tcb: &mut TransportState, segments_acked: u64) -> u64 {
        let seg = tcb.segment_size.max(1);
        let old_cwnd = tcb.cwnd / seg;
        let ssthresh = tcb.ssthresh / seg;
        let cwnd = (old_cwnd + segments_acked).min(ssthresh);
        tcb.cwnd = cwnd * seg;

        let used = cwnd.saturating_sub(old_cwnd);
        self.stats.bytes_acked_in_slow_start += used * seg;
        segments_acked.saturating_sub(used)
    }

    /// Grow the window by one segment per window of acknowledged segments.
    fn congestion_avoidance(&mut self, tcb: &mut TransportState, segments_acked: u64) {
        let seg = tcb.segment_size.max(1);
        let w = (tcb.cwnd / seg).max(1);

        if self.cwnd_cnt >= w {
            self.cwnd_cnt = 0;
            tcb.cwnd += seg;
        }

        self.cwnd_cnt += segments_acked;
        if self.cwnd_cnt >= w {
            let delta = self.cwnd_cnt / w;
            self.cwnd_cnt -= delta * w;
            tcb.cwnd += delta * seg;
        }
    }
}

impl CongestionController for Reno {
    fn name(&self) -> &str {
        "RENO"
    }

    fn on_ack(&mut self, now: Instant, tcb: &TransportState, segments_acked: u64, rtt: Duration) {
        self.stats.bytes_acked_in_total += segments_acked * tcb.segment_size;
    }

    fn increase_window(&mut self, tcb: &mut TransportState, segments_acked: u64) {
        let mut segments_acked = segments_acked;
        if tcb.in_slow_start() {
            segments_acked = self.slow_start(tcb, segments_acked);
        }
        if !tcb.in_slow_start() && segments_acked > 0 {
            self.congestion_avoidance(tcb, segments_acked);
        }
        trace!("{} cwnd={} ssthresh={}", self.name(), tcb.cwnd, tcb.ssthresh);
    }

    fn reduced_window(&self, cwnd: u64) -> u64 {
        (cwnd / 2).max(2 * self.config.segment_size)
    }

    fn on_congestion_event(&mut self, now: Instant, tcb: &mut TransportState) {
        let ssthresh = self.reduced_window(tcb.cwnd);
        tcb.reduce_window(ssthresh, self.config.min_cwnd);
        self.cwnd_cnt = 0;
        self.stats.congestion_events += 1;
        debug!(
            "{} congestion event, cwnd={} ssthresh={}",
            self.name(),
            tcb.cwnd,
            tcb.ssthresh
        );
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_reno() -> (Reno, TransportState) {
        let conf = CongestionControlConfig::default();
        let reno = Reno::new(RenoConfig::from(&conf));
        let tcb = TransportState::new(conf.segment_size, conf.initial_window());
        (reno, tcb)
    }

    #[test]
    fn reno_slow_start() {
        let (mut reno, mut tcb) = new_reno();
        assert_eq!(tcb.cwnd, 14480);

        reno.increase_window(&mut tcb, 1);
        assert_eq!(tcb.cwnd, 15928);
        reno.increase_window(&mut tcb, 10);
        assert_eq!(tcb.cwnd, 21 * 1448);
        assert_eq!(reno.stats().bytes_acked_in_slow_start, 11 * 1448);
    }

    #[test]
    fn reno_slow_start_exit() {
        let (mut reno, mut tcb) = new_reno();
        tcb.ssthresh = 12 * 1448;

        // Two segments reach ssthresh, the remaining three are counted in
        // congestion avoidance.
        reno.increase_window(&mut tcb, 5);
        assert_eq!(tcb.cwnd, 12 * 1448);
        assert!(!tcb.in_slow_start());
        assert_eq!(reno.cwnd_cnt, 3);
    }

    #[test]
    fn reno_congestion_avoidance() {
        let (mut reno, mut tcb) = new_reno();
        tcb.ssthresh = tcb.cwnd;

        // One segment per window of 10 acknowledged segments.
        for _ in 0..9 {
            reno.increase_window(&mut tcb, 1);
        }
        assert_eq!(tcb.cwnd, 14480);
        reno.increase_window(&mut tcb, 1);
        assert_eq!(tcb.cwnd, 15928);

        // A stretch acknowledgment may grow the window by several segments.
        reno.increase_window(&mut tcb, 23);
        assert_eq!(tcb.cwnd, 13 * 1448);
        assert_eq!(reno.cwnd_cnt, 1);
    }

    #[test]
    fn reno_congestion_event() {
        let now = Instant::now();
        let (mut reno, mut tcb) = new_reno();

        assert_eq!(reno.reduced_window(100000), 50000);
        assert_eq!(reno.reduced_window(4000), 2896);

        reno.on_congestion_event(now, &mut tcb);
        assert_eq!(tcb.cwnd, 7240);
        assert_eq!(tcb.ssthresh, 7240);
        assert_eq!(reno.stats().congestion_events, 1);

        reno.on_congestion_event(now, &mut tcb);
        reno.on_congestion_event(now, &mut tcb);
        assert_eq!(tcb.cwnd, 2896);

        assert!(reno.set_initial_alpha(0.5).is_err());
        assert_eq!(reno.alpha(), None);
    }
}
