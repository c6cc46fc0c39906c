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

//! LGC: ECN-proportional congestion estimation.
//!
//! The sender measures the fraction of acknowledged bytes that carried ECE
//! over each estimation window, which spans the acknowledgments up to the
//! send pointer observed when the window opened. The fraction is folded into
//! the moving average `alpha`, and a congestion signal shrinks the window by
//! `alpha / 2` instead of halving it. Window growth is the one of Reno.
//!
//! See RFC 8257 Section 3.3 for the estimator.

use std::time::Duration;
use std::time::Instant;

use log::*;

use super::CongestionControlConfig;
use super::CongestionController;
use super::CongestionEstimate;
use super::CongestionStats;
use super::EcnMode;
use super::EcnState;
use super::Reno;
use super::RenoConfig;
use super::TransportState;
use crate::packet::EcnCodepoint;
use crate::trace::EventData;
use crate::trace::EventQueue;
use crate::Error;
use crate::Result;

/// LGC configurable parameters.
#[derive(Debug, Clone)]
pub struct LgcConfig {
    /// Gain of the moving average.
    g: f64,

    /// Estimate before the first window closes.
    initial_alpha: f64,

    /// Mark outgoing packets ECT(0) instead of ECT(1).
    use_ect0: bool,

    /// Minimal congestion window in bytes.
    min_cwnd: u64,

    /// Sender maximum segment size in bytes.
    segment_size: u64,
}

impl LgcConfig {
    pub fn new(g: f64, initial_alpha: f64, use_ect0: bool) -> Self {
        Self {
            g,
            initial_alpha,
            use_ect0,
            ..Self::default()
        }
    }
}

impl Default for LgcConfig {
    fn default() -> Self {
        Self::from(&CongestionControlConfig::default())
    }
}

impl From<&CongestionControlConfig> for LgcConfig {
    fn from(conf: &CongestionControlConfig) -> Self {
        Self {
            g: conf.lgc_g,
            initial_alpha: conf.lgc_initial_alpha,
            use_ect0: conf.lgc_use_ect0,
            min_cwnd: conf.minimal_window(),
            segment_size: conf.segment_size,
        }
    }
}

/// LGC congestion control.
#[derive(Debug)]
pub struct Lgc {
    /// Configurable parameters.
    config: LgcConfig,

    /// Window growth.
    reno: Reno,

    /// Bytes acknowledged with ECE in the current window.
    acked_bytes_ecn: u64,

    /// Bytes acknowledged in the current window.
    acked_bytes_total: u64,

    /// Smoothed fraction of marked bytes.
    alpha: f64,

    /// End of the current estimation window. Unset until the first
    /// acknowledgment after a reset.
    next_seq: Option<u64>,

    /// Whether `on_init` has run.
    initialized: bool,

    /// The estimate of the last closed window.
    last_estimate: Option<CongestionEstimate>,

    stats: CongestionStats,

    events: EventQueue,
}

impl Lgc {
    pub fn new(config: LgcConfig) -> Self {
        let reno = Reno::new(RenoConfig::new(config.min_cwnd, config.segment_size));
        Self {
            reno,
            acked_bytes_ecn: 0,
            acked_bytes_total: 0,
            alpha: config.initial_alpha,
            next_seq: None,
            initialized: false,
            last_estimate: None,
            stats: Default::default(),
            events: EventQueue::default(),
            config,
        }
    }

    /// The estimate of the last closed window.
    pub fn last_estimate(&self) -> Option<CongestionEstimate> {
        self.last_estimate
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Close the estimation window and fold its marked fraction into alpha.
    fn update_alpha(&mut self, now: Instant, tcb: &TransportState) {
        let bytes_ecn = if self.acked_bytes_total > 0 {
            self.acked_bytes_ecn as f64 / self.acked_bytes_total as f64
        } else {
            0.0
        };
        self.alpha = (1.0 - self.config.g) * self.alpha + self.config.g * bytes_ecn;

        let estimate = CongestionEstimate {
            bytes_marked: self.acked_bytes_ecn,
            bytes_total: self.acked_bytes_total,
            alpha: self.alpha,
        };
        self.last_estimate = Some(estimate);
        self.stats.estimation_windows += 1;
        self.events.add(
            now,
            EventData::CongestionEstimateUpdated {
                bytes_marked: estimate.bytes_marked,
                bytes_total: estimate.bytes_total,
                alpha: estimate.alpha,
            },
        );
        trace!(
            "{} window closed, bytes_ecn={} alpha={}",
            self.name(),
            bytes_ecn,
            self.alpha
        );

        self.reset(tcb);
    }

    fn reset(&mut self, tcb: &TransportState) {
        self.next_seq = Some(tcb.next_tx_seq);
        self.acked_bytes_ecn = 0;
        self.acked_bytes_total = 0;
    }
}

impl CongestionController for Lgc {
    fn name(&self) -> &str {
        "LGC"
    }

    fn on_init(&mut self, tcb: &mut TransportState) {
        tcb.use_ecn = true;
        tcb.ecn_mode = EcnMode::Proportional;
        tcb.ect_codepoint = if self.config.use_ect0 {
            EcnCodepoint::Ect0
        } else {
            EcnCodepoint::Ect1
        };
        self.initialized = true;
        debug!(
            "{} enable proportional ECN, codepoint {:?}",
            self.name(),
            tcb.ect_codepoint
        );
    }

    fn on_ack(&mut self, now: Instant, tcb: &TransportState, segments_acked: u64, rtt: Duration) {
        if !self.initialized {
            warn!("{} acknowledgment before initialization", self.name());
            return;
        }

        let acked_bytes = segments_acked * tcb.segment_size;
        self.acked_bytes_total += acked_bytes;
        self.stats.bytes_acked_in_total += acked_bytes;
        if tcb.ecn_state == EcnState::EceReceived {
            self.acked_bytes_ecn += acked_bytes;
            self.stats.bytes_ecn_in_total += acked_bytes;
        }

        let next_seq = *self.next_seq.get_or_insert(tcb.next_tx_seq);
        if tcb.last_acked_seq >= next_seq {
            self.update_alpha(now, tcb);
        }
    }

    fn increase_window(&mut self, tcb: &mut TransportState, segments_acked: u64) {
        self.reno.increase_window(tcb, segments_acked);
    }

    fn reduced_window(&self, cwnd: u64) -> u64 {
        ((1.0 - self.alpha / 2.0) * cwnd as f64) as u64
    }

    fn on_congestion_event(&mut self, now: Instant, tcb: &mut TransportState) {
        let ssthresh = self.reduced_window(tcb.cwnd);
        tcb.reduce_window(ssthresh, self.config.min_cwnd);
        self.stats.congestion_events += 1;
        debug!(
            "{} congestion event, alpha={} cwnd={}",
            self.name(),
            self.alpha,
            tcb.cwnd
        );
    }

    fn set_initial_alpha(&mut self, alpha: f64) -> Result<()> {
        if self.initialized {
            error!("{} has already been initialized", self.name());
            return Err(Error::AlreadyInitialized);
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidConfig(format!(
                "initial alpha {} out of [0, 1]",
                alpha
            )));
        }
        self.alpha = alpha;
        Ok(())
    }

    fn alpha(&self) -> Option<f64> {
        Some(self.alpha)
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }

    fn enable_events(&mut self) {
        self.events.enable();
    }

    fn poll_event(&mut self) -> Option<(Instant, EventData)> {
        self.events.poll()
    }
}
