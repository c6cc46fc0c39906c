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

use std::collections::VecDeque;

use crate::packet::Packet;
use crate::units::QueueSize;

/// A bounded FIFO that rejects packets arriving when it is full.
#[derive(Debug)]
pub struct DropTailQueue {
    /// Queued packets, oldest first.
    items: VecDeque<Packet>,

    /// Capacity in packets or bytes.
    max_size: QueueSize,

    /// Total size of queued packets in bytes.
    n_bytes: u64,
}

impl DropTailQueue {
    pub fn new(max_size: QueueSize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
            n_bytes: 0,
        }
    }

    pub fn max_size(&self) -> QueueSize {
        self.max_size
    }

    /// Number of queued packets.
    pub fn n_packets(&self) -> u64 {
        self.items.len() as u64
    }

    /// Number of queued bytes.
    pub fn n_bytes(&self) -> u64 {
        self.n_bytes
    }

    /// Occupancy in the unit of the queue's limit.
    pub fn current_size(&self) -> u64 {
        self.max_size.occupancy(self.n_packets(), self.n_bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a packet. The packet is handed back if the queue is full.
    pub fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet> {
        if self
            .max_size
            .would_overflow(self.n_packets(), self.n_bytes, pkt.size)
        {
            return Err(pkt);
        }

        self.n_bytes += pkt.size;
        self.items.push_back(pkt);
        Ok(())
    }

    /// Remove the oldest packet.
    pub fn dequeue(&mut self) -> Option<Packet> {
        let pkt = self.items.pop_front()?;
        self.n_bytes -= pkt.size;
        Some(pkt)
    }

    /// The oldest packet, without removing it.
    pub fn peek(&self) -> Option<&Packet> {
        self.items.front()
    }

    /// Remove every queued packet.
    pub fn drain(&mut self) -> impl Iterator<Item = Packet> + '_ {
        self.n_bytes = 0;
        self.items.drain(..)
    }
}
