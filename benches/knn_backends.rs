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

use cloud_toolbox::geometry::{Point3, PointCloud};
use cloud_toolbox::knn::{BruteForce, KdTree, NearestNeighbors, ParallelBruteForce};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;
use std::sync::Arc;

fn random_cloud(n: usize, seed: u64) -> Arc<PointCloud<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let points = (0..n)
        .map(|_| Point3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0)))
        .collect();
    Arc::new(PointCloud::new(points))
}

fn bench_kneighbors(c: &mut Criterion) {
    let cloud = random_cloud(20_000, 1);
    let query = Point3::new(0.0, 0.0, 0.0);

    let mut brute = BruteForce::new();
    brute.set_input(Arc::clone(&cloud)).unwrap();
    let mut parallel = ParallelBruteForce::new();
    parallel.set_input(Arc::clone(&cloud)).unwrap();
    let mut kdtree = KdTree::new();
    kdtree.set_input(Arc::clone(&cloud)).unwrap();

    c.bench_function("BruteForce::kneighbors(k=20) over 20k points", |b| {
        b.iter(|| black_box(brute.kneighbors(&query, 20).unwrap()))
    });
    c.bench_function("ParallelBruteForce::kneighbors(k=20) over 20k points", |b| {
        b.iter(|| black_box(parallel.kneighbors(&query, 20).unwrap()))
    });
    c.bench_function("KdTree::kneighbors(k=20) over 20k points", |b| {
        b.iter(|| black_box(kdtree.kneighbors(&query, 20).unwrap()))
    });
}

fn bench_radius_search(c: &mut Criterion) {
    let cloud = random_cloud(20_000, 2);
    let query = Point3::new(0.0, 0.0, 0.0);

    let mut brute = BruteForce::new();
    brute.set_input(Arc::clone(&cloud)).unwrap();
    let mut kdtree = KdTree::new();
    kdtree.set_input(Arc::clone(&cloud)).unwrap();

    c.bench_function("BruteForce::radius_search(r=5) over 20k points", |b| {
        b.iter(|| black_box(brute.radius_search(&query, 5.0).unwrap()))
    });
    c.bench_function("KdTree::radius_search(r=5) over 20k points", |b| {
        b.iter(|| black_box(kdtree.radius_search(&query, 5.0).unwrap()))
    });
}

fn bench_kdtree_construction(c: &mut Criterion) {
    let cloud = random_cloud(50_000, 3);
    c.bench_function("KdTree construction over 50k points", |b| {
        b.iter(|| {
            let mut kdtree = KdTree::new();
            kdtree.set_input(Arc::clone(&cloud)).unwrap();
            black_box(kdtree);
        })
    });
}

criterion_group!(benches, bench_kneighbors, bench_radius_search, bench_kdtree_construction);
criterion_main!(benches);
