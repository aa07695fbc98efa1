// Fixed-capacity ring buffer, one per priority level
// NOTE: No dynamic allocation; storage is sized at compile time.
// The ring is a read index plus a count; the write slot is derived.

use core::fmt;

/// Queue priority levels. Larger is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl Priority {
    pub const COUNT: usize = 3;

    /// Service order for one dispatch pass, most urgent first.
    pub const SWEEP: [Priority; Priority::COUNT] =
        [Priority::High, Priority::Normal, Priority::Low];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Priority::Low),
            1 => Some(Priority::Normal),
            2 => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Normal => write!(f, "Normal"),
            Priority::High => write!(f, "High"),
        }
    }
}

/// What a full queue does with one more item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Reject the incoming item.
    #[default]
    DropNewest,
    /// Evict the oldest queued item to make room.
    DropOldest,
}

/// Snapshot of one queue's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub pending: usize,
    pub high_water: usize,
    pub dropped: u32,
    pub capacity: usize,
}

// ring buffer for queued work
pub struct TaskQueue<T, const N: usize> {
    buf: [Option<T>; N],
    read: usize, // next to read
    count: usize,
    high_water: usize,
    dropped: u32,
}

impl<T, const N: usize> TaskQueue<T, N> {
    const NON_EMPTY: () = assert!(N > 0, "a queue needs at least one slot");

    pub const fn new() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            buf: [const { None }; N],
            read: 0,
            count: 0,
            high_water: 0,
            dropped: 0,
        }
    }

    /// Append at the tail. A full queue hands the item back.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.count >= N {
            self.dropped = self.dropped.wrapping_add(1);
            return Err(item);
        }
        let write = (self.read + self.count) % N;
        self.buf[write] = Some(item);
        self.count += 1;
        if self.count > self.high_water {
            self.high_water = self.count;
        }
        Ok(())
    }

    /// Append, evicting the oldest item when full. Returns the evicted item.
    pub fn push_replacing(&mut self, item: T) -> Option<T> {
        let evicted = if self.count >= N {
            self.dropped = self.dropped.wrapping_add(1);
            self.pop()
        } else {
            None
        };
        // N > 0, so at least one slot is free now
        let _ = self.push(item);
        evicted
    }

    pub fn push_with(&mut self, item: T, overflow: Overflow) -> Result<Option<T>, T> {
        match overflow {
            Overflow::DropNewest => self.push(item).map(|()| None),
            Overflow::DropOldest => Ok(self.push_replacing(item)),
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let item = self.buf[self.read].take();
        self.read = (self.read + 1) % N;
        self.count -= 1;
        item
    }

    pub fn peek(&self) -> Option<&T> {
        if self.count == 0 {
            None
        } else {
            self.buf[self.read].as_ref()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= N
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop every queued item; returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let mut n = 0;
        while self.pop().is_some() {
            n += 1;
        }
        n
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.count,
            high_water: self.high_water,
            dropped: self.dropped,
            capacity: N,
        }
    }
}

impl<T, const N: usize> Default for TaskQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = TaskQueue::<u32, 8>::new();
        for i in 0..5 {
            assert!(q.push(i).is_ok());
        }
        for i in 0..5 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn full_queue_rejects_exactly_at_capacity() {
        let mut q = TaskQueue::<u32, 4>::new();
        for i in 0..4 {
            assert!(q.push(i).is_ok());
        }
        assert!(q.is_full());
        assert_eq!(q.push(99), Err(99));
        assert_eq!(q.stats().dropped, 1);

        // two pops free exactly two slots
        q.pop();
        q.pop();
        assert!(q.push(10).is_ok());
        assert!(q.push(11).is_ok());
        assert_eq!(q.push(12), Err(12));
    }

    #[test]
    fn wraps_around_the_array() {
        let mut q = TaskQueue::<u32, 3>::new();
        for round in 0..4 {
            for i in 0..3 {
                assert!(q.push(round * 10 + i).is_ok());
            }
            for i in 0..3 {
                assert_eq!(q.pop(), Some(round * 10 + i));
            }
        }
        assert!(q.is_empty());
    }

    #[test]
    fn drop_oldest_evicts_head() {
        let mut q = TaskQueue::<u32, 3>::new();
        for i in 0..3 {
            q.push(i).unwrap();
        }
        assert_eq!(q.push_with(3, Overflow::DropOldest), Ok(Some(0)));
        assert_eq!(q.len(), 3);
        assert_eq!(q.peek(), Some(&1));
        assert_eq!(q.push_with(4, Overflow::DropNewest), Err(4));
    }

    #[test]
    fn single_slot_queue_replaces_in_place() {
        let mut q = TaskQueue::<u32, 1>::new();
        assert_eq!(q.push_replacing(1), None);
        assert_eq!(q.push_replacing(2), Some(1));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.stats().dropped, 1);
    }

    #[test]
    fn high_water_survives_drain() {
        let mut q = TaskQueue::<u32, 8>::new();
        for i in 0..6 {
            q.push(i).unwrap();
        }
        assert_eq!(q.clear(), 6);
        let stats = q.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.high_water, 6);
        assert_eq!(stats.capacity, 8);
    }

    #[test]
    fn sweep_is_most_urgent_first() {
        assert!(Priority::High > Priority::Normal);
        assert_eq!(Priority::SWEEP[0], Priority::High);
        assert_eq!(Priority::SWEEP[2], Priority::Low);
        assert_eq!(Priority::from_level(1), Some(Priority::Normal));
        assert_eq!(Priority::from_level(3), None);
    }
}
