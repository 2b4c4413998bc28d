//! Deferred tasks
//!
//! Work the wall loop runs later (chained next after a shuffle, intro
//! skips). The loop sleeps until `next_deadline()` and then pops every due
//! task. Ties fire in scheduling order.

use goobert_common::CellId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    /// Loop-aware next on every cell
    NextAllUnlessLooping,
    /// Seek past the intro of `file` if `cell` is still playing it
    SkipIntro { cell: CellId, file: String },
}

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    seq: u64,
    task: DeferredTask,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, earliest deadline must pop first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct DeferredQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, task: DeferredTask, delay: Duration, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline: now + delay,
            seq,
            task,
        });
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Remove and return every task due at `now`, earliest first
    pub fn pop_due(&mut self, now: Instant) -> Vec<DeferredTask> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|e| e.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                due.push(entry.task);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip(col: usize) -> DeferredTask {
        DeferredTask::SkipIntro {
            cell: CellId::new(0, col),
            file: format!("/m/{}.mp4", col),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_due_in_deadline_order() {
        let mut queue = DeferredQueue::new();
        let now = Instant::now();
        queue.schedule(skip(2), Duration::from_millis(300), now);
        queue.schedule(skip(1), Duration::from_millis(100), now);
        queue.schedule(DeferredTask::NextAllUnlessLooping, Duration::from_millis(200), now);

        assert_eq!(queue.next_deadline(), Some(now + Duration::from_millis(100)));
        assert!(queue.pop_due(now).is_empty());

        let due = queue.pop_due(now + Duration::from_millis(250));
        assert_eq!(due, vec![skip(1), DeferredTask::NextAllUnlessLooping]);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ties_keep_scheduling_order() {
        let mut queue = DeferredQueue::new();
        let now = Instant::now();
        for col in 0..4 {
            queue.schedule(skip(col), Duration::from_millis(50), now);
        }
        let due = queue.pop_due(now + Duration::from_millis(50));
        assert_eq!(due, (0..4).map(skip).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let mut queue = DeferredQueue::new();
        queue.schedule(skip(0), Duration::from_secs(1), Instant::now());
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.next_deadline(), None);
    }
}
