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

//! A discrete-event scheduler.
//!
//! Events are processed one at a time in `(deadline, insertion order)` order,
//! so two events scheduled for the same instant fire in the order they were
//! scheduled.

use std::time::Duration;
use std::time::Instant;

use priority_queue::double_priority_queue::DoublePriorityQueue;
use slab::Slab;

/// Handle of a scheduled event, used to cancel it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId {
    /// Slot of the task in the slab.
    key: usize,

    /// Insertion sequence. Distinguishes a reused slot from the original one.
    seq: u64,
}

/// Store scheduled tasks, sorted by which one is going to expire first.
pub struct Scheduler<T> {
    timers: DoublePriorityQueue<EventId, (Instant, u64)>,

    tasks: Slab<(u64, T)>,

    /// Sequence for the next scheduled task.
    next_seq: u64,
}

impl<T> Scheduler<T> {
    /// Create a new Scheduler.
    pub fn new() -> Self {
        Self {
            timers: DoublePriorityQueue::new(),
            tasks: Slab::new(),
            next_seq: 0,
        }
    }

    /// Creates an empty scheduler with a specific capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timers: DoublePriorityQueue::with_capacity(capacity),
            tasks: Slab::with_capacity(capacity),
            next_seq: 0,
        }
    }

    /// Return the number of pending events.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Return if there are no pending events.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Schedule `task` to run after `delay`. A deadline past the range of
    /// `Instant` is clamped to the latest representable one.
    pub fn schedule(&mut self, now: Instant, delay: Duration, task: T) -> EventId {
        let mut delay = delay;
        let deadline = loop {
            match now.checked_add(delay) {
                Some(deadline) => break deadline,
                None => delay /= 2,
            }
        };
        self.schedule_at(deadline, task)
    }

    /// Schedule `task` to run at `deadline`.
    pub fn schedule_at(&mut self, deadline: Instant, task: T) -> EventId {
        let seq = self.next_seq;
        self.next_seq += 1;

        let key = self.tasks.insert((seq, task));
        let id = EventId { key, seq };
        _ = self.timers.push(id, (deadline, seq));
        id
    }

    /// Cancel a pending event and return its task.
    ///
    /// Return None if the event already fired or was already canceled.
    pub fn cancel(&mut self, id: EventId) -> Option<T> {
        self.timers.remove(&id)?;
        Some(self.tasks.remove(id.key).1)
    }

    /// Whether the event is still waiting to fire.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.timers.get_priority(&id).is_some()
    }

    /// Return the deadline of the earliest pending event.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.timers.peek_min().map(|(_, (deadline, _))| *deadline)
    }

    /// Return the amount of time remaining for the earliest pending event.
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        self.next_timeout()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Return the next expired event if any.
    pub fn next_expire(&mut self, now: Instant) -> Option<(EventId, Instant, T)> {
        let (_, (deadline, _)) = self.timers.peek_min()?;
        if *deadline > now {
            return None;
        }
        self.pop()
    }

    /// Remove and return the earliest pending event regardless of its
    /// deadline. Used by a harness that advances simulated time to the next
    /// event.
    pub fn pop(&mut self) -> Option<(EventId, Instant, T)> {
        let (id, (deadline, _)) = self.timers.pop_min()?;
        let (_, task) = self.tasks.remove(id.key);
        Some((id, deadline, task))
    }

    /// Cancel all pending events.
    pub fn clear(&mut self) {
        self.timers.clear();
        self.tasks.clear();
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule() {
        let mut sched = Scheduler::with_capacity(10);
        assert!(sched.is_empty());

        let now = Instant::now();
        let a = sched.schedule(now, Duration::from_millis(100), "a");
        assert_eq!(sched.len(), 1);

        let b = sched.schedule(now, Duration::from_millis(200), "b");
        assert_eq!(sched.len(), 2);
        assert_ne!(a, b);
        assert!(sched.is_pending(a));
        assert!(sched.is_pending(b));
    }

    #[test]
    fn cancel_once() {
        let mut sched = Scheduler::default();

        let now = Instant::now();
        let a = sched.schedule(now, Duration::from_millis(100), 1);
        assert_eq!(sched.cancel(a), Some(1));
        assert!(!sched.is_pending(a));
        assert!(sched.is_empty());

        // A second cancel is rejected.
        assert_eq!(sched.cancel(a), None);
    }

    #[test]
    fn cancel_stale_handle() {
        let mut sched = Scheduler::default();

        let now = Instant::now();
        let a = sched.schedule(now, Duration::from_millis(100), 1);
        assert_eq!(sched.next_expire(now + Duration::from_millis(100)).map(|e| e.2), Some(1));

        // The slab slot is reused by the next task, the stale handle must not
        // cancel it.
        let b = sched.schedule(now, Duration::from_millis(100), 2);
        assert_eq!(sched.cancel(a), None);
        assert!(sched.is_pending(b));
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn expired() {
        let mut sched = Scheduler::default();

        let now = Instant::now();
        sched.schedule(now, Duration::from_millis(100), 0);
        sched.schedule(now, Duration::from_millis(200), 1);
        let c = sched.schedule(now, Duration::from_millis(300), 2);
        assert!(sched.next_expire(now).is_none());
        assert_eq!(sched.len(), 3);

        let t = now + Duration::from_millis(100);
        let (_, deadline, task) = sched.next_expire(t).unwrap();
        assert_eq!(deadline, t);
        assert_eq!(task, 0);
        assert_eq!(sched.len(), 2);

        sched.cancel(c);
        sched.schedule(now, Duration::from_millis(1000), 3);
        sched.schedule(now, Duration::from_millis(1000), 4);
        sched.schedule(now, Duration::from_millis(1500), 5);
        let t = now + Duration::from_millis(1000);
        assert_eq!(sched.next_expire(t).map(|e| e.2), Some(1));
        assert_eq!(sched.next_expire(t).map(|e| e.2), Some(3));
        assert_eq!(sched.next_expire(t).map(|e| e.2), Some(4));
        assert!(sched.next_expire(t).is_none());
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn same_deadline_fifo() {
        let mut sched = Scheduler::default();
        let now = Instant::now();
        for i in 0..100 {
            sched.schedule_at(now, i);
        }
        for i in 0..100 {
            assert_eq!(sched.pop().map(|e| e.2), Some(i));
        }
        assert!(sched.pop().is_none());
    }

    #[test]
    fn time_remaining() {
        let mut sched = Scheduler::default();

        let now = Instant::now();
        assert_eq!(sched.time_remaining(now), None);

        sched.schedule(now, Duration::from_millis(100), ());
        sched.schedule(now, Duration::from_millis(200), ());
        assert_eq!(sched.time_remaining(now), Some(Duration::from_millis(100)));
        assert_eq!(
            sched.time_remaining(now + Duration::from_secs(1)),
            Some(Duration::ZERO)
        );
        assert_eq!(sched.next_timeout(), Some(now + Duration::from_millis(100)));

        sched.clear();
        assert!(sched.is_empty());
        assert_eq!(sched.next_timeout(), None);
    }

    #[test]
    fn schedule_far_future() {
        let mut sched = Scheduler::new();
        let now = Instant::now();

        sched.schedule(now, Duration::MAX, 1);
        sched.schedule(now, Duration::from_millis(100), 2);
        assert_eq!(sched.len(), 2);
        assert!(sched.next_expire(now + Duration::from_secs(3600)).is_some());
        assert!(sched.next_expire(now + Duration::from_secs(3600)).is_none());
        assert!(sched.next_timeout().unwrap() > now + Duration::from_secs(3600));
    }
}
