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

use serde::Deserialize;
use serde::Serialize;

use crate::packet::EcnCodepoint;
use crate::registry::Registry;
use crate::trace::EventData;
use crate::Error;
use crate::Result;
pub use lgc::Lgc;
pub use lgc::LgcConfig;
pub use reno::Reno;
pub use reno::RenoConfig;

/// How the sender reacts to congestion signals carried by ECN.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum EcnMode {
    /// One window reduction per round trip with ECE, as a loss would do.
    #[default]
    Classic,

    /// Window reduction proportional to the fraction of marked bytes.
    Proportional,
}

/// ECN feedback state of a connection.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum EcnState {
    /// No congestion signal is pending.
    #[default]
    Idle,

    /// The receiver observed a CE-marked packet and has not echoed it yet.
    CeReceived,

    /// The sender received an acknowledgment carrying ECE.
    EceReceived,

    /// The sender reduced its window and signalled CWR.
    CwrSent,
}

/// The per-connection transport control block shared with the congestion
/// controller.
#[derive(Debug, Clone)]
pub struct TransportState {
    /// Sender maximum segment size in bytes.
    pub segment_size: u64,

    /// Congestion window in bytes.
    pub cwnd: u64,

    /// Slow start threshold in bytes.
    pub ssthresh: u64,

    /// Sequence number of the next byte to send.
    pub next_tx_seq: u64,

    /// Highest cumulatively acknowledged sequence number.
    pub last_acked_seq: u64,

    /// Bytes sent and not yet acknowledged.
    pub bytes_in_flight: u64,

    /// Whether ECN is negotiated for the connection.
    pub use_ecn: bool,

    pub ecn_mode: EcnMode,

    pub ecn_state: EcnState,

    /// Codepoint set on outgoing ECN-capable packets.
    pub ect_codepoint: EcnCodepoint,
}

impl TransportState {
    pub fn new(segment_size: u64, initial_cwnd: u64) -> Self {
        Self {
            segment_size,
            cwnd: initial_cwnd,
            ssthresh: u64::MAX,
            next_tx_seq: 0,
            last_acked_seq: 0,
            bytes_in_flight: 0,
            use_ecn: false,
            ecn_mode: EcnMode::default(),
            ecn_state: EcnState::default(),
            ect_codepoint: EcnCodepoint::NotEct,
        }
    }

    /// Check if in slow start.
    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// Codepoint of the next outgoing packet.
    pub fn outgoing_ecn(&self) -> EcnCodepoint {
        if self.use_ecn {
            self.ect_codepoint
        } else {
            EcnCodepoint::NotEct
        }
    }

    /// Whether the window allows sending `bytes` more.
    pub fn can_send(&self, bytes: u64) -> bool {
        self.bytes_in_flight + bytes <= self.cwnd
    }

    /// Advance the send pointer by `bytes`.
    pub fn on_sent(&mut self, bytes: u64) {
        self.next_tx_seq += bytes;
        self.bytes_in_flight += bytes;
    }

    /// Process a cumulative acknowledgment up to `ack_seq`. Return the number
    /// of newly acknowledged bytes.
    pub fn on_ack_received(&mut self, ack_seq: u64, ece: bool) -> u64 {
        let acked = ack_seq.saturating_sub(self.last_acked_seq);
        self.last_acked_seq = self.last_acked_seq.max(ack_seq);
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(acked);

        if !self.use_ecn {
            return acked;
        }
        self.ecn_state = match (ece, self.ecn_state) {
            (true, _) => EcnState::EceReceived,
            (false, EcnState::EceReceived) | (false, EcnState::CwrSent) => EcnState::Idle,
            (false, state) => state,
        };
        acked
    }

    /// Forget `bytes` of in-flight data declared lost.
    pub fn on_lost(&mut self, bytes: u64) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes);
    }

    /// Apply a window reduction.
    pub(crate) fn reduce_window(&mut self, ssthresh: u64, min_cwnd: u64) {
        self.ssthresh = ssthresh.max(min_cwnd);
        self.cwnd = self.ssthresh;
        if self.ecn_state == EcnState::EceReceived {
            self.ecn_state = EcnState::CwrSent;
        }
    }
}

/// The signal emitted by an estimator each time an estimation window closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CongestionEstimate {
    /// Acknowledged bytes that carried ECE in the window.
    pub bytes_marked: u64,

    /// Acknowledged bytes in the window.
    pub bytes_total: u64,

    /// Smoothed fraction of marked bytes after the update.
    pub alpha: f64,
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone)]
pub struct CongestionStats {
    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes acked in slow start.
    pub bytes_acked_in_slow_start: u64,

    /// Total bytes acked with ECE.
    pub bytes_ecn_in_total: u64,

    /// Number of window reductions.
    pub congestion_events: u64,

    /// Number of closed estimation windows.
    pub estimation_windows: u64,
}

/// Configurations about congestion control.
#[derive(Debug, Clone)]
pub struct CongestionControlConfig {
    /// Sender maximum segment size in bytes.
    pub segment_size: u64,

    /// Initial congestion window in packets.
    pub initial_congestion_window: u64,

    /// Minimal congestion window in packets.
    pub min_congestion_window: u64,

    /// Gain of the marked fraction moving average.
    pub lgc_g: f64,

    /// Estimate of the marked fraction before the first window closes.
    pub lgc_initial_alpha: f64,

    /// Set ECT(0) instead of ECT(1) on outgoing packets.
    pub lgc_use_ect0: bool,
}

impl CongestionControlConfig {
    /// Set the segment size. The default value is 1448.
    pub fn set_segment_size(&mut self, v: u64) {
        self.segment_size = v;
    }

    /// Set the initial congestion window in packets. The default value is 10.
    pub fn set_initial_congestion_window(&mut self, v: u64) {
        self.initial_congestion_window = v;
    }

    /// Set the minimal congestion window in packets. The default value is 2.
    pub fn set_min_congestion_window(&mut self, v: u64) {
        self.min_congestion_window = v;
    }

    /// Set the estimator gain in (0, 1]. The default value is 1/16.
    pub fn set_lgc_g(&mut self, v: f64) {
        self.lgc_g = v;
    }

    /// Set the initial estimate in [0, 1]. The default value is 1.
    pub fn set_lgc_initial_alpha(&mut self, v: f64) {
        self.lgc_initial_alpha = v;
    }

    /// Use ECT(0) for outgoing packets. The default value is false.
    pub fn set_lgc_use_ect0(&mut self, v: bool) {
        self.lgc_use_ect0 = v;
    }

    /// Initial congestion window in bytes.
    pub fn initial_window(&self) -> u64 {
        self.initial_congestion_window
            .saturating_mul(self.segment_size)
    }

    /// Minimal congestion window in bytes.
    pub fn minimal_window(&self) -> u64 {
        self.min_congestion_window.saturating_mul(self.segment_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            return Err(Error::InvalidConfig("zero segment size".into()));
        }
        if !(self.lgc_g > 0.0 && self.lgc_g <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "gain {} out of (0, 1]",
                self.lgc_g
            )));
        }
        if !(0.0..=1.0).contains(&self.lgc_initial_alpha) {
            return Err(Error::InvalidConfig(format!(
                "initial alpha {} out of [0, 1]",
                self.lgc_initial_alpha
            )));
        }
        Ok(())
    }
}

impl Default for CongestionControlConfig {
    fn default() -> Self {
        Self {
            segment_size: crate::DEFAULT_SEGMENT_SIZE,
            initial_congestion_window: 10,
            min_congestion_window: 2,
            lgc_g: 1.0 / 16.0,
            lgc_initial_alpha: 1.0,
            lgc_use_ect0: false,
        }
    }
}

/// Congestion control interfaces shared by different algorithms.
///
/// The transport owns the [`TransportState`] and passes it to every call.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback when the controller is attached to a connection. Must be
    /// called before the first acknowledgment is processed.
    fn on_init(&mut self, tcb: &mut TransportState) {}

    /// Callback for processing each acknowledgment.
    fn on_ack(&mut self, now: Instant, tcb: &TransportState, segments_acked: u64, rtt: Duration) {
    }

    /// Grow the congestion window after an acknowledgment.
    fn increase_window(&mut self, tcb: &mut TransportState, segments_acked: u64);

    /// The slow start threshold after a congestion signal for the window
    /// `cwnd`. It does not change the controller state.
    fn reduced_window(&self, cwnd: u64) -> u64;

    /// Congestion event.
    fn on_congestion_event(&mut self, now: Instant, tcb: &mut TransportState);

    /// Set the initial congestion estimate. Fails once the controller is
    /// attached.
    fn set_initial_alpha(&mut self, alpha: f64) -> Result<()> {
        Err(Error::InvalidOperation(format!(
            "{} has no congestion estimate",
            self.name()
        )))
    }

    /// Current congestion estimate, if the algorithm keeps one.
    fn alpha(&self) -> Option<f64> {
        None
    }

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;

    /// Start buffering trace events.
    fn enable_events(&mut self) {}

    /// Return the oldest buffered trace event.
    fn poll_event(&mut self) -> Option<(Instant, EventData)> {
        None
    }
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Constructor of a congestion controller.
pub type CongestionControllerConstructor =
    fn(&CongestionControlConfig) -> Box<dyn CongestionController>;

/// Congestion control algorithms by name.
pub type CongestionControlRegistry = Registry<CongestionControllerConstructor>;

fn new_reno(conf: &CongestionControlConfig) -> Box<dyn CongestionController> {
    Box::new(Reno::new(RenoConfig::from(conf)))
}

fn new_lgc(conf: &CongestionControlConfig) -> Box<dyn CongestionController> {
    Box::new(Lgc::new(LgcConfig::from(conf)))
}

impl Registry<CongestionControllerConstructor> {
    /// A registry holding the built-in algorithms.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("Reno", new_reno).register("Lgc", new_lgc);
        registry
    }

    /// Build a congestion controller.
    pub fn build(
        &self,
        name: &str,
        conf: &CongestionControlConfig,
    ) -> Result<Box<dyn CongestionController>> {
        let ctor = self.get(name)?;
        conf.validate()?;
        Ok(ctor(conf))
    }
}


mod lgc;
mod reno;
