// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Data-parallel algorithms over slices — for-each, transform, reduce,
//! inclusive scan, merge sort, and a tim-sort variant tuned for small runs.
//!
//! These dispatch their own short-lived batch of scoped threads via
//! `std::thread::scope` rather than routing through the persistent
//! [`super::pool::ThreadPool`]: the pool's `submit` requires `'static`
//! closures, while these algorithms need to borrow caller-owned slices for
//! the lifetime of a single call. A fresh batch of workers is spawned per
//! call, rather than drawing from a long-lived pool, generalized across the
//! different reduction shapes below. Work is always
//! divided into `max(concurrency_hint, hardware_parallelism)` chunks,
//! floored by an algorithm-specific minimum chunk size so tiny inputs don't
//! pay thread-spawn overhead for no benefit.

use crate::error::{Error, ErrorKind, Result};
use std::cmp::Ordering;
use std::ops::Range;

const MIN_CHUNK_FOR_EACH: usize = 256;
const MIN_CHUNK_TRANSFORM: usize = 256;
const MIN_CHUNK_REDUCE: usize = 256;
const MIN_CHUNK_SCAN: usize = 256;
const MIN_CHUNK_SORT: usize = 512;
const TIM_RUN_LEN: usize = 32;

fn panicked() -> Error {
    ErrorKind::NumericalFailure("a worker thread panicked".into()).into()
}

fn target_chunk_count(len: usize, concurrency_hint: usize, min_chunk: usize) -> usize {
    let desired = concurrency_hint.max(num_cpus::get()).max(1);
    let capped_by_min_chunk = (len / min_chunk.max(1)).max(1);
    desired.min(capped_by_min_chunk).min(len.max(1))
}

fn chunk_ranges(len: usize, n_chunks: usize) -> Vec<Range<usize>> {
    let n_chunks = n_chunks.max(1).min(len.max(1));
    let base = len / n_chunks;
    let rem = len % n_chunks;
    let mut ranges = Vec::with_capacity(n_chunks);
    let mut start = 0;
    for i in 0..n_chunks {
        let size = base + usize::from(i < rem);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

fn chunk_ranges_of_size(len: usize, size: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Splits `items` into disjoint mutable slices matching `ranges`, which
/// must be contiguous, ascending, and cover `items` exactly.
fn split_mut_by_ranges<'a, T>(items: &'a mut [T], ranges: &[Range<usize>]) -> Vec<&'a mut [T]> {
    let mut rest = items;
    let mut result = Vec::with_capacity(ranges.len());
    let mut prev_end = 0;
    for r in ranges {
        let (_, tail) = rest.split_at_mut(r.start - prev_end);
        let (chunk, new_rest) = tail.split_at_mut(r.end - r.start);
        result.push(chunk);
        rest = new_rest;
        prev_end = r.end;
    }
    result
}

/// Applies `f` to every element of `items`, in unspecified order, across up
/// to `max(concurrency_hint, hardware_parallelism)` worker threads.
pub fn parallel_for_each<T, F>(items: &[T], concurrency_hint: usize, f: F) -> Result<()>
where
    T: Sync,
    F: Fn(&T) + Sync,
{
    if items.is_empty() {
        return Ok(());
    }
    let n_chunks = target_chunk_count(items.len(), concurrency_hint, MIN_CHUNK_FOR_EACH);
    let chunks = chunk_ranges(items.len(), n_chunks);
    std::thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|range| {
                scope.spawn(move || {
                    for i in range {
                        f(&items[i]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().map_err(|_| panicked())?;
        }
        Ok(())
    })
}

/// Maps `f` over every element of `items`, preserving order.
pub fn parallel_transform<T, R, F>(items: &[T], concurrency_hint: usize, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let n_chunks = target_chunk_count(items.len(), concurrency_hint, MIN_CHUNK_TRANSFORM);
    let chunks = chunk_ranges(items.len(), n_chunks);
    std::thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|range| scope.spawn(move || range.map(|i| f(&items[i])).collect::<Vec<R>>()))
            .collect();
        let mut out = Vec::with_capacity(items.len());
        for h in handles {
            out.extend(h.join().map_err(|_| panicked())?);
        }
        Ok(out)
    })
}

/// Folds `items` with `op`, starting from `identity`, across chunks run in
/// parallel and then combined. When the input is small enough to collapse
/// to a single chunk, folds sequentially in-place rather than paying for a
/// scoped-thread round trip that would only ever touch one chunk.
pub fn parallel_reduce<T, F>(items: &[T], identity: T, op: F, concurrency_hint: usize) -> Result<T>
where
    T: Send + Clone,
    F: Fn(&T, &T) -> T + Sync,
{
    if items.is_empty() {
        return Ok(identity);
    }
    let n_chunks = target_chunk_count(items.len(), concurrency_hint, MIN_CHUNK_REDUCE);
    if n_chunks <= 1 {
        return Ok(items.iter().fold(identity, |acc, x| op(&acc, x)));
    }
    let chunks = chunk_ranges(items.len(), n_chunks);
    std::thread::scope(|scope| {
        let op = &op;
        let identity = &identity;
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|range| {
                scope.spawn(move || range.fold(identity.clone(), |acc, i| op(&acc, &items[i])))
            })
            .collect();
        let mut acc = identity.clone();
        for h in handles {
            let partial = h.join().map_err(|_| panicked())?;
            acc = op(&acc, &partial);
        }
        Ok(acc)
    })
}

/// Inclusive scan: `result[i] = op(op(...op(identity, items[0])...), items[i])`.
///
/// Two passes, as is standard for a parallel scan: each chunk computes its
/// own local inclusive scan starting from `identity` (pass one, in
/// parallel), then the chunk totals are folded into carry-in offsets and
/// applied to every element of their chunk (pass two).
pub fn parallel_inclusive_scan<T, F>(
    items: &[T],
    identity: T,
    op: F,
    concurrency_hint: usize,
) -> Result<Vec<T>>
where
    T: Send + Clone,
    F: Fn(&T, &T) -> T + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let n_chunks = target_chunk_count(items.len(), concurrency_hint, MIN_CHUNK_SCAN);
    let chunks = chunk_ranges(items.len(), n_chunks);

    let chunk_results: Vec<(Vec<T>, T)> = std::thread::scope(|scope| {
        let op = &op;
        let identity = &identity;
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|range| {
                scope.spawn(move || {
                    let mut local = Vec::with_capacity(range.len());
                    let mut acc = identity.clone();
                    for i in range {
                        acc = op(&acc, &items[i]);
                        local.push(acc.clone());
                    }
                    let total = local.last().cloned().unwrap_or_else(|| identity.clone());
                    (local, total)
                })
            })
            .collect();
        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            out.push(h.join().map_err(|_| panicked())?);
        }
        Ok(out)
    })?;

    let mut offset = identity;
    let mut result = Vec::with_capacity(items.len());
    for (local, total) in chunk_results {
        for v in &local {
            result.push(op(&offset, v));
        }
        offset = op(&offset, &total);
    }
    Ok(result)
}

fn insertion_sort<T>(slice: &mut [T], cmp: &impl Fn(&T, &T) -> Ordering) {
    for i in 1..slice.len() {
        let mut j = i;
        while j > 0 && cmp(&slice[j - 1], &slice[j]) == Ordering::Greater {
            slice.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn merge_sorted<T: Clone>(left: &[T], right: &[T], cmp: &impl Fn(&T, &T) -> Ordering) -> Vec<T> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if cmp(&left[i], &right[j]) != Ordering::Greater {
            out.push(left[i].clone());
            i += 1;
        } else {
            out.push(right[j].clone());
            j += 1;
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
    out
}

/// Sequential pairwise merge cascade combining already-sorted runs back
/// into `items`. The expensive part (sorting each run) already ran in
/// parallel; merging `log2(runs)` levels of already-sorted data is cheap by
/// comparison, so this stays single-threaded for simplicity.
fn merge_cascade<T, C>(items: &mut [T], ranges: Vec<Range<usize>>, cmp: &C) -> Result<()>
where
    T: Clone,
    C: Fn(&T, &T) -> Ordering,
{
    let mut current: Vec<Vec<T>> = ranges.into_iter().map(|r| items[r].to_vec()).collect();
    while current.len() > 1 {
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        let mut it = current.into_iter();
        while let Some(a) = it.next() {
            match it.next() {
                Some(b) => next.push(merge_sorted(&a, &b, cmp)),
                None => next.push(a),
            }
        }
        current = next;
    }
    let sorted = current.into_iter().next().unwrap_or_default();
    items.clone_from_slice(&sorted);
    Ok(())
}

/// Sorts `items` in place: each chunk is sorted independently in parallel,
/// then merged back together.
pub fn parallel_merge_sort<T, C>(items: &mut [T], concurrency_hint: usize, cmp: C) -> Result<()>
where
    T: Send + Clone,
    C: Fn(&T, &T) -> Ordering + Sync,
{
    if items.len() < 2 {
        return Ok(());
    }
    let n_chunks = target_chunk_count(items.len(), concurrency_hint, MIN_CHUNK_SORT);
    let ranges = chunk_ranges(items.len(), n_chunks);
    {
        let cmp = &cmp;
        std::thread::scope(|scope| {
            let handles: Vec<_> = split_mut_by_ranges(items, &ranges)
                .into_iter()
                .map(|chunk| scope.spawn(move || chunk.sort_by(|a, b| cmp(a, b))))
                .collect();
            for h in handles {
                h.join().map_err(|_| panicked())?;
            }
            Ok::<(), Error>(())
        })?;
    }
    merge_cascade(items, ranges, &cmp)
}

/// Sorts `items` in place: fixed-size runs of up to 32 elements are
/// insertion-sorted in parallel (insertion sort beats a general-purpose
/// sort on runs this small), then merged back together, as TimSort does
/// for its smallest runs.
pub fn parallel_tim_sort<T, C>(items: &mut [T], concurrency_hint: usize, cmp: C) -> Result<()>
where
    T: Send + Clone,
    C: Fn(&T, &T) -> Ordering + Sync,
{
    let _ = concurrency_hint;
    if items.len() < 2 {
        return Ok(());
    }
    let ranges = chunk_ranges_of_size(items.len(), TIM_RUN_LEN);
    {
        let cmp = &cmp;
        std::thread::scope(|scope| {
            let handles: Vec<_> = split_mut_by_ranges(items, &ranges)
                .into_iter()
                .map(|run| scope.spawn(move || insertion_sort(run, cmp)))
                .collect();
            for h in handles {
                h.join().map_err(|_| panicked())?;
            }
            Ok::<(), Error>(())
        })?;
    }
    merge_cascade(items, ranges, &cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

    #[test]
    fn for_each_visits_every_element_exactly_once() {
        let items: Vec<i64> = (0..10_000).collect();
        let sum = AtomicI64::new(0);
        parallel_for_each(&items, 8, |x| {
            sum.fetch_add(*x, AtomicOrdering::Relaxed);
        })
        .unwrap();
        assert_eq!(sum.load(AtomicOrdering::Relaxed), 10_000 * 9_999 / 2);
    }

    #[test]
    fn transform_preserves_order() {
        let items: Vec<i32> = (0..5_000).collect();
        let doubled = parallel_transform(&items, 8, |x| x * 2).unwrap();
        assert_eq!(doubled, items.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn reduce_matches_sequential_sum() {
        let items: Vec<i64> = (0..20_000).collect();
        let total = parallel_reduce(&items, 0i64, |a, b| a + b, 8).unwrap();
        assert_eq!(total, items.iter().sum::<i64>());
    }

    #[test]
    fn reduce_single_chunk_matches_sequential() {
        let items = vec![1i64, 2, 3, 4];
        let total = parallel_reduce(&items, 0i64, |a, b| a + b, 1).unwrap();
        assert_eq!(total, 10);
    }

    // The inclusive-scan end-to-end scenario: scanning 1..=10000 with `+`
    // must reproduce the triangular numbers.
    #[test]
    fn inclusive_scan_matches_prefix_sum() {
        let items: Vec<i64> = (1..=10_000).collect();
        let scanned = parallel_inclusive_scan(&items, 0i64, |a, b| a + b, 8).unwrap();
        let mut expected = Vec::with_capacity(items.len());
        let mut acc = 0i64;
        for x in &items {
            acc += x;
            expected.push(acc);
        }
        assert_eq!(scanned, expected);
        assert_eq!(*scanned.last().unwrap(), 10_000 * 10_001 / 2);
    }

    #[test]
    fn merge_sort_sorts_reversed_input() {
        let mut items: Vec<i32> = (0..5_000).rev().collect();
        parallel_merge_sort(&mut items, 8, |a, b| a.cmp(b)).unwrap();
        assert!(items.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(items.first(), Some(&0));
        assert_eq!(items.last(), Some(&4999));
    }

    #[test]
    fn tim_sort_sorts_small_and_large_inputs() {
        let mut small = vec![5, 3, 1, 4, 2];
        parallel_tim_sort(&mut small, 4, |a, b| a.cmp(b)).unwrap();
        assert_eq!(small, vec![1, 2, 3, 4, 5]);

        let mut large: Vec<i32> = (0..3_333).rev().collect();
        parallel_tim_sort(&mut large, 4, |a, b| a.cmp(b)).unwrap();
        assert!(large.windows(2).all(|w| w[0] <= w[1]));
    }
}
