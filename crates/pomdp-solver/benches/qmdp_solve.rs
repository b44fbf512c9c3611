use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use pomdp_core::belief::Belief;
use pomdp_core::problems::{TigerAction, TigerConfig, TigerPomdp};
use pomdp_solver::{SolverConfig, simulate, solve};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn bench_tiger_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("qmdp_solve");
    let model = TigerPomdp::new(TigerConfig::default()).expect("valid model");

    for iterations in [10usize, 100, 1_000] {
        let config = SolverConfig::default()
            .with_max_iterations(iterations)
            .with_tolerance(f64::MIN_POSITIVE);
        group.bench_function(format!("tiger_{iterations}_sweeps"), |b| {
            b.iter(|| black_box(solve(&model, config).expect("solves")))
        });
    }

    group.finish();
}

fn bench_tiger_rollout(c: &mut Criterion) {
    let mut group = c.benchmark_group("qmdp_rollout");
    let model = TigerPomdp::new(TigerConfig::default()).expect("valid model");
    let policy = solve(&model, SolverConfig::default()).expect("solves");

    for seed in [42u64, 12345, 8675309] {
        group.bench_function(format!("tiger_100_steps_seed{seed}"), |b| {
            b.iter_batched(
                || StdRng::seed_from_u64(seed),
                |rng| {
                    let _ = black_box(simulate(&model, &policy, 100, rng));
                },
                BatchSize::SmallInput,
            )
        });
    }

    let belief = Belief::from_weights(vec![0.85, 0.15]).expect("valid");
    group.bench_function("tiger_best_action", |b| {
        b.iter(|| {
            let action: &TigerAction = policy.best_action(black_box(&belief));
            black_box(*action)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_tiger_solve, bench_tiger_rollout);
criterion_main!(benches);
