//! Deterministic max-priority work queue.
//!
//! Key properties:
//! - Total ordering on `(priority, id)`: the largest priority pops first.
//! - Equal priorities are processed in insertion order.
//! - Optional frame budgeting via abstract work units.
//!
//! Priorities must be totally ordered; wrap floats in
//! `foundation::math::StableF64` before pushing.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::budget::FrameBudget;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkId(pub u64);

#[derive(Debug)]
struct Item<P, T> {
    priority: P,
    id: WorkId,
    cost_units: u32,
    payload: T,
}

impl<P: Ord, T> PartialEq for Item<P, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P: Ord, T> Eq for Item<P, T> {}

impl<P: Ord, T> Ord for Item<P, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: bigger priority wins, then the older id.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<P: Ord, T> PartialOrd for Item<P, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct WorkQueue<P, T> {
    next_id: u64,
    heap: BinaryHeap<Item<P, T>>,
}

impl<P: Ord, T> Default for WorkQueue<P, T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            heap: BinaryHeap::new(),
        }
    }
}

impl<P: Ord, T> WorkQueue<P, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, priority: P, payload: T) -> WorkId {
        self.push_with_cost(priority, 1, payload)
    }

    pub fn push_with_cost(&mut self, priority: P, cost_units: u32, payload: T) -> WorkId {
        let id = WorkId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.heap.push(Item {
            priority,
            id,
            cost_units,
            payload,
        });
        id
    }

    /// The item that [`pop_next`](Self::pop_next) would return.
    pub fn peek(&self) -> Option<(&P, &T)> {
        self.heap.peek().map(|item| (&item.priority, &item.payload))
    }

    /// Pops the next (highest priority, then oldest) item.
    pub fn pop_next(&mut self) -> Option<(WorkId, P, T)> {
        let item = self.heap.pop()?;
        Some((item.id, item.priority, item.payload))
    }

    /// Pops the next item, but only if the budget can cover its cost.
    ///
    /// If the next item is too expensive, this returns `None` without
    /// searching for cheaper items, keeping behavior aligned with priority
    /// ordering.
    pub fn pop_next_with_budget(&mut self, budget: &mut FrameBudget) -> Option<(WorkId, P, T)> {
        let cost_units = self.heap.peek()?.cost_units;
        if !budget.try_consume(cost_units) {
            return None;
        }
        self.pop_next()
    }

    /// Removes every item and returns them in pop order.
    pub fn drain_ordered(&mut self) -> Vec<(WorkId, P, T)> {
        let mut items = std::mem::take(&mut self.heap).into_sorted_vec();
        // `into_sorted_vec` is ascending; pop order is the reverse.
        items.reverse();
        items
            .into_iter()
            .map(|item| (item.id, item.priority, item.payload))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::WorkQueue;
    use crate::budget::FrameBudget;

    #[test]
    fn same_priority_is_insertion_order() {
        let mut q = WorkQueue::new();
        q.push(0, "a");
        q.push(0, "b");
        q.push(0, "c");

        let (_, _, a) = q.pop_next().unwrap();
        let (_, _, b) = q.pop_next().unwrap();
        let (_, _, c) = q.pop_next().unwrap();
        assert_eq!((a, b, c), ("a", "b", "c"));
    }

    #[test]
    fn higher_priority_value_runs_first() {
        let mut q = WorkQueue::new();
        q.push(-1, "late");
        q.push(10, "early");
        assert_eq!(q.peek(), Some((&10, &"early")));
        let (_, p, v) = q.pop_next().unwrap();
        assert_eq!((p, v), (10, "early"));
    }

    #[test]
    fn drain_matches_pop_order_and_empties() {
        let mut q = WorkQueue::new();
        q.push(1, "b");
        q.push(5, "a");
        q.push(1, "c");
        q.push(0, "d");

        let drained: Vec<&str> = q.drain_ordered().into_iter().map(|(_, _, v)| v).collect();
        assert_eq!(drained, vec!["a", "b", "c", "d"]);
        assert!(q.is_empty());
        assert!(q.pop_next().is_none());
    }

    #[test]
    fn pop_respects_budget_units() {
        let mut q = WorkQueue::new();
        q.push_with_cost(0, 2, "expensive");

        let mut budget = FrameBudget::new(1);
        assert!(q.pop_next_with_budget(&mut budget).is_none());
        assert_eq!(q.len(), 1);

        let mut budget = FrameBudget::new(2);
        let (_, _, v) = q.pop_next_with_budget(&mut budget).unwrap();
        assert_eq!(v, "expensive");
        assert!(q.is_empty());
    }
}
