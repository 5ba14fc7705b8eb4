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

use cloud_toolbox::concurrent::parallel::{parallel_inclusive_scan, parallel_merge_sort, parallel_reduce, parallel_tim_sort, parallel_transform};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_transform(c: &mut Criterion) {
    let items: Vec<i64> = (0..200_000).collect();
    c.bench_function("parallel_transform over 200k i64", |b| {
        b.iter(|| black_box(parallel_transform(&items, 8, |x| x * 2).unwrap()))
    });
}

fn bench_reduce(c: &mut Criterion) {
    let items: Vec<i64> = (0..200_000).collect();
    c.bench_function("parallel_reduce (sum) over 200k i64", |b| {
        b.iter(|| black_box(parallel_reduce(&items, 0i64, |a, b| a + b, 8).unwrap()))
    });
}

fn bench_inclusive_scan(c: &mut Criterion) {
    let items: Vec<i64> = (0..100_000).collect();
    c.bench_function("parallel_inclusive_scan over 100k i64", |b| {
        b.iter(|| black_box(parallel_inclusive_scan(&items, 0i64, |a, b| a + b, 8).unwrap()))
    });
}

fn bench_sorts(c: &mut Criterion) {
    let base: Vec<i32> = (0..50_000).rev().collect();

    c.bench_function("parallel_merge_sort on 50k reversed i32", |b| {
        b.iter(|| {
            let mut items = base.clone();
            parallel_merge_sort(&mut items, 8, |a, b| a.cmp(b)).unwrap();
            black_box(items);
        })
    });

    c.bench_function("parallel_tim_sort on 50k reversed i32", |b| {
        b.iter(|| {
            let mut items = base.clone();
            parallel_tim_sort(&mut items, 8, |a, b| a.cmp(b)).unwrap();
            black_box(items);
        })
    });
}

criterion_group!(benches, bench_transform, bench_reduce, bench_inclusive_scan, bench_sorts);
criterion_main!(benches);
