//! The event-scheduling kernel (§4.A): a min-time-ordered priority queue with
//! stable FIFO tie-breaking, plus timeouts and named wait-conditions.
//!
//! Each simulator embeds exactly one [`EventQueue`]. The queue is
//! intentionally `!Sync`-by-convention: it is driven by a single
//! [`SimulatorRuntime`](crate::runtime::SimulatorRuntime) and is not meant to
//! be shared across threads (§5: "single-threaded cooperative inside each
//! simulator runtime").

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use mobility_wire::{RuntimeError, Time};

/// A handle returned by [`EventQueue::schedule`], usable to [`EventQueue::cancel`]
/// a still-pending entry.
///
/// `EventKey` is the direct analogue of the teacher's `SchedulerKey`: an
/// opaque, copyable handle that outlives the entry it names and is simply
/// ignored by `cancel` if the entry already fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey(u64);

/// Internal payload wrapper distinguishing plain scheduled events from
/// resolved wait-conditions.
enum Payload<T> {
    Plain(T),
    Triggered(String, T),
    /// An unresolved wait-condition placeholder. Parked at `Time::INFINITY`;
    /// never fires through ordinary clock advancement, only by being
    /// replaced via [`EventQueue::trigger`].
    Pending,
}

/// One entry in the kernel's priority queue: `(time, seq, payload)` (§3
/// "Scheduled Event").
struct Entry<T> {
    time: Time,
    seq: u64,
    payload: Payload<T>,
}

impl<T> Entry<T> {
    fn key(&self) -> EventKey {
        EventKey(self.seq)
    }
}

// Entries order by `(time, seq)` ascending, but `BinaryHeap` is a max-heap,
// so comparisons are reversed to turn it into a min-heap — the same trick
// used by the ride-hailing `SimulationClock` this kernel is grounded on.
impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A scheduled event that fired: either a caller-supplied payload, or the
/// resolution of a wait-condition that was [`EventQueue::trigger`]ed from
/// outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fired<T> {
    /// A normally scheduled event (or a timeout, which is just an event
    /// scheduled for its own sake).
    Event(T),
    /// A wait-condition resolved by an external `trigger(name, value)` call.
    /// `name` is the condition that resolved; `value` is whatever was passed
    /// to `trigger`.
    Triggered { name: String, value: T },
}

/// The per-simulator event-scheduling kernel (§4.A).
///
/// `T` is the simulator-defined payload carried by each scheduled event —
/// typically a small enum specific to the embedding simulator describing
/// "what to do next".
pub struct EventQueue<T> {
    clock: Time,
    next_seq: u64,
    heap: BinaryHeap<Entry<T>>,
    cancelled: HashSet<EventKey>,
    wait_conditions: HashMap<String, EventKey>,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            clock: Time::ZERO,
            next_seq: 0,
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            wait_conditions: HashMap::new(),
        }
    }

    /// Creates a queue whose clock starts at `start`.
    pub fn starting_at(start: Time) -> Self {
        Self {
            clock: start,
            ..Self::new()
        }
    }

    /// The queue's current virtual time.
    pub fn clock(&self) -> Time {
        self.clock
    }

    /// Schedules `payload` to fire at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::TimeWentBackwards`] if `at` is before the
    /// current clock.
    pub fn schedule(&mut self, payload: T, at: Time) -> Result<EventKey, RuntimeError> {
        if at < self.clock {
            return Err(RuntimeError::TimeWentBackwards {
                current: self.clock.as_minutes(),
                target: at.as_minutes(),
            });
        }
        Ok(self.push(Payload::Plain(payload), at))
    }

    /// Schedules a no-op timeout `delta_minutes` from now, firing as a plain
    /// [`Fired::Event`] carrying `payload` (§4.A "the kernel also supports
    /// timeouts").
    pub fn schedule_timeout(&mut self, payload: T, delta_minutes: f64) -> EventKey {
        let at = self.clock.plus_minutes(delta_minutes);
        self.push(Payload::Plain(payload), at)
    }

    /// Schedules a named wait-condition: a placeholder that never fires on
    /// its own and is only resolved by an external [`Self::trigger`] call
    /// (§4.A).
    ///
    /// Scheduling a second wait-condition under the same `name` before the
    /// first resolves replaces the first (only the most recent holder of a
    /// given name can be triggered).
    pub fn wait_for(&mut self, name: impl Into<String>) -> EventKey {
        let name = name.into();
        if let Some(stale) = self.wait_conditions.remove(&name) {
            self.cancelled.insert(stale);
        }
        let key = self.raw_push(Payload::Pending, Time::INFINITY);
        self.wait_conditions.insert(name, key);
        key
    }

    /// Resolves the named wait-condition, if any is pending, causing its
    /// holder to resume at the *current* clock value — never in the past,
    /// per §4.A.
    pub fn trigger(&mut self, name: &str, value: T) -> Result<(), RuntimeError> {
        let key = self
            .wait_conditions
            .remove(name)
            .ok_or_else(|| RuntimeError::UnknownWaitCondition {
                name: name.to_string(),
            })?;
        self.cancelled.insert(key);
        self.push(Payload::Triggered(name.to_string(), value), self.clock);
        Ok(())
    }

    /// Lazily cancels a still-pending entry. A cancelled entry is silently
    /// dropped when the queue pops past it; cancelling an already-fired or
    /// already-cancelled key is a no-op.
    pub fn cancel(&mut self, handle: EventKey) {
        self.cancelled.insert(handle);
    }

    /// The time of the next live (non-cancelled) entry, or [`Time::INFINITY`]
    /// if the queue is empty. Pure: does not mutate the queue.
    pub fn peek(&self) -> Time {
        self.heap
            .iter()
            .filter(|e| !self.cancelled.contains(&e.key()))
            .map(|e| e.time)
            .min()
            .unwrap_or(Time::INFINITY)
    }

    /// Pops the earliest live entry, advancing the clock to its time.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::EmptyQueue`] if no live entry remains.
    pub fn pop(&mut self) -> Result<Fired<T>, RuntimeError> {
        loop {
            let entry = self.heap.pop().ok_or(RuntimeError::EmptyQueue)?;
            if self.cancelled.remove(&entry.key()) {
                continue;
            }
            self.clock = entry.time;
            return Ok(match entry.payload {
                Payload::Plain(t) => Fired::Event(t),
                Payload::Triggered(name, t) => Fired::Triggered { name, value: t },
            });
        }
    }

    /// Advances the clock to `t` with no work performed, provided no earlier
    /// live event exists.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::TimeWentBackwards`] if `t` is before the
    /// current clock.
    pub fn advance_to(&mut self, t: Time) -> Result<(), RuntimeError> {
        if t < self.clock {
            return Err(RuntimeError::TimeWentBackwards {
                current: self.clock.as_minutes(),
                target: t.as_minutes(),
            });
        }
        self.clock = t;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.peek().is_infinite()
    }

    fn push(&mut self, payload: Payload<T>, at: Time) -> EventKey {
        self.raw_push(payload, at)
    }

    fn raw_push(&mut self, payload: Payload<T>, at: Time) -> EventKey {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = Entry { time: at, seq, payload };
        let key = entry.key();
        self.heap.push(entry);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_order() {
        let mut q = EventQueue::new();
        q.schedule("b", Time::from_minutes(20.0)).unwrap();
        q.schedule("a", Time::from_minutes(5.0)).unwrap();
        q.schedule("c", Time::from_minutes(10.0)).unwrap();

        let first = q.pop().unwrap();
        assert!(matches!(first, Fired::Event("a")));
        assert_eq!(q.clock(), Time::from_minutes(5.0));
    }

    #[test]
    fn fifo_tie_break_on_equal_time() {
        let mut q = EventQueue::new();
        q.schedule("first", Time::from_minutes(10.0)).unwrap();
        q.schedule("second", Time::from_minutes(10.0)).unwrap();

        assert!(matches!(q.pop().unwrap(), Fired::Event("first")));
        assert!(matches!(q.pop().unwrap(), Fired::Event("second")));
    }

    #[test]
    fn cancel_drops_entry_silently() {
        let mut q = EventQueue::new();
        let handle = q.schedule("cancel me", Time::from_minutes(1.0)).unwrap();
        q.schedule("survivor", Time::from_minutes(2.0)).unwrap();
        q.cancel(handle);

        assert!(matches!(q.pop().unwrap(), Fired::Event("survivor")));
        assert_eq!(q.clock(), Time::from_minutes(2.0));
    }

    #[test]
    fn peek_is_idempotent() {
        let mut q = EventQueue::new();
        q.schedule("x", Time::from_minutes(3.0)).unwrap();
        assert_eq!(q.peek(), Time::from_minutes(3.0));
        assert_eq!(q.peek(), Time::from_minutes(3.0));
    }

    #[test]
    fn empty_queue_peeks_infinite_and_pop_errors() {
        let mut q: EventQueue<()> = EventQueue::new();
        assert_eq!(q.peek(), Time::INFINITY);
        assert!(matches!(q.pop(), Err(RuntimeError::EmptyQueue)));
    }

    #[test]
    fn wait_condition_resolves_at_current_clock() {
        let mut q = EventQueue::new();
        q.schedule("tick", Time::from_minutes(5.0)).unwrap();
        q.wait_for("boarding:User1");

        assert!(matches!(q.pop().unwrap(), Fired::Event("tick")));
        assert_eq!(q.clock(), Time::from_minutes(5.0));

        q.trigger("boarding:User1", "resumed").unwrap();
        match q.pop().unwrap() {
            Fired::Triggered { name, value } => {
                assert_eq!(name, "boarding:User1");
                assert_eq!(value, "resumed");
            }
            _ => panic!("expected a Triggered event"),
        }
        assert_eq!(q.clock(), Time::from_minutes(5.0));
    }

    #[test]
    fn schedule_before_clock_is_rejected() {
        let mut q = EventQueue::new();
        q.advance_to(Time::from_minutes(10.0)).unwrap();
        assert!(q.schedule("late", Time::from_minutes(5.0)).is_err());
    }
}
