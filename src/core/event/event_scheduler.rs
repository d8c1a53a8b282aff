use super::event::Event;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: f64,
    pub sequence_num: u64,
    pub event: Event,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.sequence_num.cmp(&self.sequence_num))
    }
}

/// Queue of pending events ordered by absolute time, then insertion order.
#[derive(Debug, Default)]
pub struct EventScheduler {
    event_queue: BinaryHeap<ScheduledEvent>,
    sequence_counter: u64,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event at absolute time `time`.
    pub fn schedule(&mut self, event: Event, time: f64) {
        self.event_queue.push(ScheduledEvent {
            time,
            sequence_num: self.sequence_counter,
            event,
        });
        self.sequence_counter += 1;
    }

    /// Remove and return the earliest event.
    pub fn pop_next(&mut self) -> Option<ScheduledEvent> {
        self.event_queue.pop()
    }

    #[cfg(test)]
    pub(crate) fn peek_next_time(&self) -> Option<f64> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn len(&self) -> usize {
        self.event_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_queue.is_empty()
    }

    /// Pending events in dispatch order, without consuming the queue.
    pub fn ordered(&self) -> Vec<ScheduledEvent> {
        let mut events: Vec<ScheduledEvent> = self.event_queue.iter().cloned().collect();
        // Ord is reversed, so descending order is dispatch order.
        events.sort_by(|a, b| b.cmp(a));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EventKey;

    fn key(e: &ScheduledEvent) -> u64 {
        match e.event {
            Event::Step(k) => k.0,
            Event::Once { .. } => u64::MAX,
        }
    }

    #[test]
    fn test_time_order() {
        let mut scheduler = EventScheduler::new();
        scheduler.schedule(Event::Step(EventKey(0)), 0.3);
        scheduler.schedule(Event::Step(EventKey(1)), 0.1);
        scheduler.schedule(Event::Step(EventKey(2)), 0.2);

        let order: Vec<u64> = std::iter::from_fn(|| scheduler.pop_next()).map(|e| key(&e)).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_ties_break_by_insertion() {
        let mut scheduler = EventScheduler::new();
        for k in 0..5 {
            scheduler.schedule(Event::Step(EventKey(k)), 1.0);
        }
        let ordered: Vec<u64> = scheduler.ordered().iter().map(key).collect();
        assert_eq!(ordered, vec![0, 1, 2, 3, 4]);
        assert_eq!(scheduler.len(), 5);
        assert_eq!(key(&scheduler.pop_next().unwrap()), 0);
    }
}
