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

//! An alternate parallel-algorithms backend delegating to `rayon`'s global thread pool,
//! enabled by the `rayon-backend` feature. Same contracts as
//! [`super::parallel`], for callers who'd rather share rayon's pool (e.g.
//! because other dependencies already spun one up) than pay for this
//! crate's own scoped-thread dispatch.

use crate::error::Result;
use rayon::prelude::*;
use std::cmp::Ordering;

pub fn parallel_for_each<T, F>(items: &[T], f: F) -> Result<()>
where
    T: Sync,
    F: Fn(&T) + Sync,
{
    items.par_iter().for_each(&f);
    Ok(())
}

pub fn parallel_transform<T, R, F>(items: &[T], f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    Ok(items.par_iter().map(&f).collect())
}

pub fn parallel_reduce<T, F>(items: &[T], identity: T, op: F) -> Result<T>
where
    T: Send + Sync + Clone,
    F: Fn(&T, &T) -> T + Sync,
{
    Ok(items
        .par_iter()
        .cloned()
        .reduce(|| identity.clone(), |a, b| op(&a, &b)))
}

pub fn parallel_merge_sort<T, C>(items: &mut [T], cmp: C) -> Result<()>
where
    T: Send,
    C: Fn(&T, &T) -> Ordering + Sync,
{
    items.par_sort_by(cmp);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_matches_sequential_sum() {
        let items: Vec<i64> = (0..10_000).collect();
        let total = parallel_reduce(&items, 0i64, |a, b| a + b).unwrap();
        assert_eq!(total, items.iter().sum::<i64>());
    }

    #[test]
    fn merge_sort_sorts_reversed_input() {
        let mut items: Vec<i32> = (0..2_000).rev().collect();
        parallel_merge_sort(&mut items, |a, b| a.cmp(b)).unwrap();
        assert!(items.windows(2).all(|w| w[0] <= w[1]));
    }
}
