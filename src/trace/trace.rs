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

//! Observability of queue disciplines and congestion estimators.
//!
//! Components buffer their events in an [`EventQueue`] that is disabled by
//! default. A harness enables it, polls the events after each step, and may
//! stream them into a [`TraceWriter`].

use std::collections::VecDeque;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

pub use self::events::Event;
pub use self::events::EventData;
pub use self::events::EventImportance;
use crate::Error;
use crate::Result;

/// The serialization format of trace files.
/// See RFC 7464: JavaScript Object Notation (JSON) Text Sequences
pub const JSON_TEXT_SEQS: &str = "JSON-SEQ";

/// Record separator that starts every JSON text in a sequence.
const RECORD_SEPARATOR: &[u8] = b"\x1e";

/// Event buffer of a component. Events are dropped while it is disabled.
#[derive(Debug, Default)]
pub struct EventQueue(Option<VecDeque<(Instant, EventData)>>);

impl EventQueue {
    /// Enable the event queue.
    pub fn enable(&mut self) {
        if self.0.is_none() {
            self.0 = Some(VecDeque::new());
        }
    }

    /// Whether events are being collected.
    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Add an event. Return false if the queue is disabled.
    pub fn add(&mut self, time: Instant, data: EventData) -> bool {
        if let Some(events) = &mut self.0 {
            events.push_back((time, data));
            return true;
        }
        false
    }

    /// Return the oldest buffered event.
    pub fn poll(&mut self) -> Option<(Instant, EventData)> {
        if let Some(events) = &mut self.0 {
            return events.pop_front();
        }
        None
    }

    /// Check whether the event queue is empty.
    pub fn is_empty(&self) -> bool {
        if let Some(events) = &self.0 {
            return events.is_empty();
        }
        true
    }
}

/// The header record of a trace file.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TraceHeader {
    /// Always "JSON-SEQ".
    pub trace_format: String,

    /// Free-text title of the trace.
    pub title: Option<String>,

    /// Free-text description of the trace.
    pub description: Option<String>,
}

/// Trace writer using JSON text sequences.
pub struct TraceWriter {
    header: TraceHeader,

    /// Events below this level will not be written out.
    level: EventImportance,

    /// The underlying writer.
    writer: Box<dyn std::io::Write + Send + Sync>,

    /// Whether the header has been written.
    ready: bool,

    /// Reference time of relative event timestamps.
    start_time: Instant,
}

impl TraceWriter {
    pub fn new(
        title: Option<String>,
        description: Option<String>,
        level: EventImportance,
        writer: Box<dyn std::io::Write + Send + Sync>,
        start_time: Instant,
    ) -> Self {
        let header = TraceHeader {
            trace_format: JSON_TEXT_SEQS.to_string(),
            title,
            description,
        };

        TraceWriter {
            header,
            level,
            writer,
            ready: false,
            start_time,
        }
    }

    /// Write the trace header.
    pub fn start(&mut self) -> Result<()> {
        if self.ready {
            return Err(Error::Done);
        }

        self.writer.as_mut().write_all(RECORD_SEPARATOR)?;
        serde_json::to_writer(self.writer.as_mut(), &self.header)?;
        self.writer.as_mut().write_all(b"\n")?;
        self.ready = true;
        Ok(())
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> Result<()> {
        if !self.ready {
            return Err(Error::InvalidState("expect ready state".into()));
        }

        self.writer.as_mut().flush()?;
        Ok(())
    }

    /// Write an event. Events less important than the writer's level are
    /// skipped with `Error::Done`.
    pub fn add_event(&mut self, event: Event) -> Result<()> {
        self.check(event.importance())?;

        self.writer.as_mut().write_all(RECORD_SEPARATOR)?;
        serde_json::to_writer(self.writer.as_mut(), &event)?;
        self.writer.as_mut().write_all(b"\n")?;
        Ok(())
    }

    /// Write an event that happened at `time`.
    pub fn add_event_data(&mut self, time: Instant, event_data: EventData) -> Result<()> {
        let event = Event::new(self.relative_time(time), event_data);
        self.add_event(event)
    }

    /// Drain the event queue of a component into the trace, tagging every
    /// event with `group_id`. Skipped events are not errors.
    pub fn drain(&mut self, queue: &mut EventQueue, group_id: &str) -> Result<()> {
        while let Some((time, data)) = queue.poll() {
            let mut event = Event::new(self.relative_time(time), data);
            event.group_id = Some(group_id.to_string());
            match self.add_event(event) {
                Ok(()) | Err(Error::Done) => (),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn check(&self, ei: EventImportance) -> Result<()> {
        if !self.ready {
            return Err(Error::InvalidState("not ready".into()));
        }
        if !ei.is_contained_in(&self.level) {
            return Err(Error::Done);
        }
        Ok(())
    }

    /// Return the relative time in milliseconds.
    pub fn relative_time(&self, time: Instant) -> f32 {
        let duration = time.saturating_duration_since(self.start_time);
        duration.as_secs_f32() * 1000.0
    }
}


pub mod events;
