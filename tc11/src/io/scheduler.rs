//! Discrete-event queue for device timing.
//!
//! Each slot (a tape unit, or the controller itself) has at most one pending
//! event. Time is counted in bus ticks.
use std::cmp::Reverse;
use std::fmt::Debug;
use std::hash::Hash;

use keyed_priority_queue::KeyedPriorityQueue;
use log::trace;

pub struct EventQueue<K: Hash + Eq + Copy + Debug> {
    // Sequence numbers keep events due on the same tick in scheduling order.
    items: KeyedPriorityQueue<K, Reverse<(u64, u64)>>,
    seq: u64,
}

impl<K: Hash + Eq + Copy + Debug> EventQueue<K> {
    pub fn new() -> Self {
        EventQueue {
            items: KeyedPriorityQueue::new(),
            seq: 0,
        }
    }

    // Replaces any event already pending for `slot`.
    pub fn schedule_after(&mut self, slot: K, now: u64, ticks: u64) {
        let due = now + ticks;
        trace!("sched: {slot:?} due at {due} (+{ticks})");
        self.seq += 1;
        self.items.push(slot, Reverse((due, self.seq)));
    }

    pub fn cancel(&mut self, slot: K) -> bool {
        self.items.remove(&slot).is_some()
    }

    pub fn is_scheduled(&self, slot: K) -> bool {
        self.items.get_priority(&slot).is_some()
    }

    pub fn due_at(&self, slot: K) -> Option<u64> {
        self.items.get_priority(&slot).map(|Reverse((due, _))| *due)
    }

    pub fn next_due(&self) -> Option<u64> {
        self.items.peek().map(|(_, Reverse((due, _)))| *due)
    }

    // Removes and returns the earliest event if it is due by `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<(K, u64)> {
        match self.next_due() {
            Some(due) if due <= now => self
                .items
                .pop()
                .map(|(slot, Reverse((due, _)))| (slot, due)),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.items = KeyedPriorityQueue::new();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Hash + Eq + Copy + Debug> Default for EventQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
