//! Merge policies for concrete request shapes.

use quarry_interfaces::p2p::response::{MergePolicy, MergeResult};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    marker::PhantomData,
    ops::RangeInclusive,
};

/// Merge policy for requests covering a contiguous span of numbered items,
/// such as a header or body range.
///
/// Responses are maps from item number to item. Payloads from different peers
/// are combined by set union over the requested range; numbers outside the
/// range and re-deliveries of already-held numbers are ignored. The result is
/// complete once every number in the range is present, so arrival order does
/// not matter.
#[derive(Debug, Clone)]
pub struct RangeMerge<T> {
    range: RangeInclusive<u64>,
    _marker: PhantomData<T>,
}

impl<T> RangeMerge<T> {
    /// Creates a policy accumulating items for the given inclusive range.
    pub const fn new(range: RangeInclusive<u64>) -> Self {
        Self { range, _marker: PhantomData }
    }

    /// The number of items the complete result holds.
    fn expected_len(&self) -> u64 {
        self.range.end().saturating_sub(*self.range.start()) + 1
    }
}

impl<T: Send + Unpin + 'static> MergePolicy for RangeMerge<T> {
    type Data = BTreeMap<u64, T>;

    fn merge(
        &mut self,
        accumulated: Option<Self::Data>,
        incoming: Self::Data,
    ) -> MergeResult<Self::Data> {
        let mut acc = accumulated.unwrap_or_default();
        let mut changed = false;
        for (number, item) in incoming {
            if !self.range.contains(&number) {
                continue
            }
            if let Entry::Vacant(entry) = acc.entry(number) {
                entry.insert(item);
                changed = true;
            }
        }

        if acc.len() as u64 == self.expected_len() {
            MergeResult::Complete(acc)
        } else if changed {
            MergeResult::Progress(acc)
        } else if acc.is_empty() {
            MergeResult::NoProgress(None)
        } else {
            MergeResult::NoProgress(Some(acc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(numbers: impl IntoIterator<Item = u64>) -> BTreeMap<u64, u64> {
        numbers.into_iter().map(|n| (n, n * 10)).collect()
    }

    #[test]
    fn accumulates_until_complete() {
        let mut policy = RangeMerge::new(0..=3);
        let acc = match policy.merge(None, items(0..=1)) {
            MergeResult::Progress(acc) => acc,
            other => panic!("expected progress, got {other:?}"),
        };
        match policy.merge(Some(acc), items(2..=3)) {
            MergeResult::Complete(acc) => assert_eq!(acc, items(0..=3)),
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn redelivery_is_no_progress() {
        let mut policy = RangeMerge::new(0..=3);
        let acc = policy.merge(None, items(0..=1));
        let MergeResult::Progress(acc) = acc else { panic!("expected progress") };
        match policy.merge(Some(acc.clone()), items(0..=1)) {
            MergeResult::NoProgress(Some(unchanged)) => assert_eq!(unchanged, acc),
            other => panic!("expected no progress, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_items_are_ignored() {
        let mut policy = RangeMerge::new(10..=11);
        match policy.merge(None, items(0..=5)) {
            MergeResult::NoProgress(None) => {}
            other => panic!("expected no progress, got {other:?}"),
        }
    }

    #[test]
    fn order_of_arrival_is_irrelevant() {
        let mut forward = RangeMerge::new(0..=3);
        let mut backward = RangeMerge::new(0..=3);

        let acc = forward.merge(None, items(0..=1)).into_data();
        let forward_result = forward.merge(acc, items(2..=3));

        let acc = backward.merge(None, items(2..=3)).into_data();
        let backward_result = backward.merge(acc, items(0..=1));

        assert_eq!(forward_result, backward_result);
        assert_eq!(forward_result, MergeResult::Complete(items(0..=3)));
    }
}
