//! The URL frontier: pending work plus the visited record behind one
//! state map, so a URL is either unknown, queued, or visited and can
//! never be enqueued twice.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use crate::url_utils;

/// A unit of crawl work.
#[derive(Debug, Clone)]
pub struct FrontierItem {
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub priority: u32,
}

impl FrontierItem {
    pub fn new(url: &str, depth: u32, parent_url: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            depth,
            parent_url,
            discovered_at: Utc::now(),
            priority: depth,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Dequeue discipline. FIFO gives breadth-first traversal; priority
/// serves the lowest value first, falling back to insertion order on ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontierOrder {
    #[default]
    Fifo,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Added,
    Duplicate,
    AtCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlState {
    Queued,
    Visited,
}

/// Heap entry ordered for a min-heap: lowest priority value first, then
/// earliest insertion.
#[derive(Debug)]
struct HeapEntry {
    priority: u32,
    seq: u64,
    item: FrontierItem,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed so BinaryHeap's max-heap pops the smallest.
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

#[derive(Debug)]
enum Pending {
    Fifo(VecDeque<FrontierItem>),
    Priority(BinaryHeap<HeapEntry>),
}

impl Pending {
    fn len(&self) -> usize {
        match self {
            Pending::Fifo(queue) => queue.len(),
            Pending::Priority(heap) => heap.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FrontierStatsSnapshot {
    pub enqueued: u64,
    pub dequeued: u64,
    pub duplicates_skipped: u64,
    pub dropped_at_capacity: u64,
    pub queue_size: usize,
    pub visited_count: usize,
    pub total_discovered: usize,
}

/// FIFO or priority queue of pending URLs with built-in deduplication.
/// URLs are keyed by normalized form; once seen (queued or visited) they
/// are never admitted again.
#[derive(Debug)]
pub struct UrlFrontier {
    pending: Pending,
    states: HashMap<String, UrlState>,
    max_size: usize,
    next_seq: u64,
    enqueued: u64,
    dequeued: u64,
    duplicates_skipped: u64,
    dropped_at_capacity: u64,
}

impl UrlFrontier {
    pub fn new(order: FrontierOrder, max_size: usize) -> Self {
        Self {
            pending: match order {
                FrontierOrder::Fifo => Pending::Fifo(VecDeque::new()),
                FrontierOrder::Priority => Pending::Priority(BinaryHeap::new()),
            },
            states: HashMap::new(),
            max_size,
            next_seq: 0,
            enqueued: 0,
            dequeued: 0,
            duplicates_skipped: 0,
            dropped_at_capacity: 0,
        }
    }

    pub fn enqueue(&mut self, item: FrontierItem) -> EnqueueOutcome {
        let key = url_utils::normalize_url(&item.url);

        if self.states.contains_key(&key) {
            self.duplicates_skipped += 1;
            return EnqueueOutcome::Duplicate;
        }

        if self.pending.len() >= self.max_size {
            self.dropped_at_capacity += 1;
            tracing::debug!(url = %item.url, max_size = self.max_size, "frontier full");
            return EnqueueOutcome::AtCapacity;
        }

        self.states.insert(key, UrlState::Queued);
        self.enqueued += 1;

        match &mut self.pending {
            Pending::Fifo(queue) => queue.push_back(item),
            Pending::Priority(heap) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                heap.push(HeapEntry {
                    priority: item.priority,
                    seq,
                    item,
                });
            }
        }

        EnqueueOutcome::Added
    }

    /// Take the next URL and mark it visited.
    pub fn dequeue(&mut self) -> Option<FrontierItem> {
        let item = match &mut self.pending {
            Pending::Fifo(queue) => queue.pop_front()?,
            Pending::Priority(heap) => heap.pop()?.item,
        };

        let key = url_utils::normalize_url(&item.url);
        self.states.insert(key, UrlState::Visited);
        self.dequeued += 1;
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.len() == 0
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_visited(&self, url: &str) -> bool {
        matches!(
            self.states.get(&url_utils::normalize_url(url)),
            Some(UrlState::Visited)
        )
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.states.contains_key(&url_utils::normalize_url(url))
    }

    pub fn visited_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == UrlState::Visited)
            .count()
    }

    pub fn stats(&self) -> FrontierStatsSnapshot {
        FrontierStatsSnapshot {
            enqueued: self.enqueued,
            dequeued: self.dequeued,
            duplicates_skipped: self.duplicates_skipped,
            dropped_at_capacity: self.dropped_at_capacity,
            queue_size: self.pending.len(),
            visited_count: self.visited_count(),
            // Every URL ever admitted: still queued or already visited.
            total_discovered: self.states.len(),
        }
    }
}
