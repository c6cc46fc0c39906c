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

use super::DropReason;
use super::QueueDisc;
use super::QueueDiscConfig;
use super::QueueDiscCore;
use crate::packet::Packet;
use crate::Result;

const NAME: &str = "FIFO";

/// A drop-tail leaf discipline. It never marks packets.
pub struct FifoQueueDisc {
    core: QueueDiscCore,

    /// Queueing delay of the last dequeued packet.
    q_delay: Duration,
}

impl FifoQueueDisc {
    pub fn new(conf: &QueueDiscConfig) -> Self {
        Self {
            core: QueueDiscCore::new(conf.max_size),
            q_delay: Duration::ZERO,
        }
    }
}

impl QueueDisc for FifoQueueDisc {
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
        self.core.set_initialized();
        debug!("{} initialized, limit {}", self.name(), self.core.max_size());
        Ok(())
    }

    fn enqueue(&mut self, now: Instant, pkt: Packet) -> bool {
        self.core.on_received(&pkt);

        if !self.core.is_active() {
            self.core.drop_before_enqueue(now, pkt, DropReason::Inactive);
            return false;
        }

        if self.core.would_overflow(pkt.size) {
            self.core.drop_before_enqueue(now, pkt, DropReason::ForcedDrop);
            return false;
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

    fn queue_delay(&self) -> Duration {
        self.q_delay
    }
}
