criterion::criterion_main!(benches);
criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .without_plots()
        .noise_threshold(3.0)
        .significance_level(0.01)
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(1));
    targets =
        building_space_cost,
        expanding_spacetime_cost,
        computing_partial_transport_exact,
        computing_partial_transport_regularized,
        computing_partial_transport_batched,
        matching_unpaired_points,
}

const STEPS: usize = 5;
const STATIONS: usize = 20;

fn stations(rng: &mut SmallRng, n: usize) -> Vec<Point> {
    (0..n)
        .map(|_| [rng.random_range(0. ..5000.), rng.random_range(0. ..5000.)])
        .collect()
}

fn spacetime(rng: &mut SmallRng) -> Array2<Cost> {
    let ref stations = stations(rng, STATIONS);
    let space = SpaceCost::from(stations.as_slice()).speed(15.).build().unwrap();
    SpaceTime::new(STEPS, 1., 1.).unwrap().expand(&space).unwrap()
}

fn demand(rng: &mut SmallRng, n: usize) -> Vec<Mass> {
    (0..n).map(|_| rng.random_range(0. ..4.)).collect()
}

fn building_space_cost(c: &mut criterion::Criterion) {
    let ref mut rng = SmallRng::seed_from_u64(0);
    let ref stations = stations(rng, 500);
    c.bench_function("build a 500x500 travel time matrix", |b| {
        b.iter(|| SpaceCost::from(stations.as_slice()).speed(15.).build().unwrap())
    });
}

fn expanding_spacetime_cost(c: &mut criterion::Criterion) {
    let ref mut rng = SmallRng::seed_from_u64(0);
    let ref stations = stations(rng, 100);
    let ref space = SpaceCost::from(stations.as_slice()).build().unwrap();
    let spacetime = SpaceTime::new(10, 0., 1.).unwrap();
    c.bench_function("expand a 100x100 matrix over 10 time steps", |b| {
        b.iter(|| spacetime.expand(space).unwrap())
    });
}

fn computing_partial_transport_exact(c: &mut criterion::Criterion) {
    let ref mut rng = SmallRng::seed_from_u64(0);
    let ref cost = spacetime(rng);
    let ref pred = demand(rng, STEPS * STATIONS);
    let ref truth = demand(rng, STEPS * STATIONS);
    let ot = PartialTransport::new(cost, Options::exact()).unwrap();
    c.bench_function("compute partial transport (exact, 5x20 spacetime)", |b| {
        b.iter(|| ot.cost(pred, truth).unwrap())
    });
}

fn computing_partial_transport_regularized(c: &mut criterion::Criterion) {
    let ref mut rng = SmallRng::seed_from_u64(0);
    let ref cost = spacetime(rng);
    let ref pred = demand(rng, STEPS * STATIONS);
    let ref truth = demand(rng, STEPS * STATIONS);
    let ot = PartialTransport::new(cost, Options::default().spatiotemporal(true)).unwrap();
    c.bench_function("compute partial transport (sinkhorn, 5x20 spacetime)", |b| {
        b.iter(|| ot.cost(pred, truth).unwrap())
    });
}

fn computing_partial_transport_batched(c: &mut criterion::Criterion) {
    let ref mut rng = SmallRng::seed_from_u64(0);
    let ref cost = spacetime(rng);
    let n = STEPS * STATIONS;
    let pred = Array2::from_shape_vec((16, n), demand(rng, 16 * n)).unwrap();
    let truth = Array2::from_shape_vec((16, n), demand(rng, 16 * n)).unwrap();
    let ot = PartialTransport::new(cost, Options::default().spatiotemporal(true)).unwrap();
    c.bench_function("compute partial transport (sinkhorn, batch of 16)", |b| {
        b.iter(|| ot.evaluate(pred.view(), truth.view()).unwrap())
    });
}

fn matching_unpaired_points(c: &mut criterion::Criterion) {
    let ref mut rng = SmallRng::seed_from_u64(0);
    let ref pred = stations(rng, 40);
    let ref truth = stations(rng, 50);
    let unpaired = Unpaired::default();
    c.bench_function("match 40 against 50 unpaired points", |b| {
        b.iter(|| unpaired.cost(pred, truth, None).unwrap())
    });
}

use geot::*;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
