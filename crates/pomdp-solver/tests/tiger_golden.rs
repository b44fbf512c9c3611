use pomdp_core::problems::{Side, TigerAction, TigerConfig, TigerPomdp, TigerState};
use pomdp_solver::{RunEnd, SolveStatus, SolverConfig, simulate, solve};
use rand::rngs::mock::StepRng;

// Fixed arithmetic-progression source: draw k is ((SEED + k * STRIDE) mod 2^64) / 2^64.
const SEED: u64 = 0x510e_527f_ade6_82d1;
const STRIDE: u64 = 0x9b05_688c_2b3e_6c1f;

#[test]
fn qmdp_tiger_default_solve_stops_at_iteration_cap() {
    let model = TigerPomdp::new(TigerConfig::default()).expect("valid model");
    let policy = solve(&model, SolverConfig::default()).expect("solves");
    let report = policy.report();

    // V_k = 10 (1 - 0.95^k) / 0.05 is still ~1.2 short of 200 after 100 sweeps.
    assert_eq!(report.status, SolveStatus::IterationCap);
    assert_eq!(report.iterations, 100);
    assert!((report.residual - 0.062_321_360_214_042_44).abs() < 1e-9);

    let listen = policy.alpha_for(&TigerAction::Listen).expect("listen vector");
    assert!((listen[0] - 187.815_894_155_933).abs() < 1e-9);
    let left = policy.alpha_for(&TigerAction::Left).expect("left vector");
    assert!((left[0] - 88.815_894_155_933).abs() < 1e-9);
    assert!((left[1] - 198.815_894_155_933).abs() < 1e-9);
}

#[test]
fn qmdp_tiger_ten_step_trajectory_is_stable() {
    let model = TigerPomdp::new(TigerConfig::default()).expect("valid model");
    let policy = solve(&model, SolverConfig::default()).expect("solves");
    let outcome =
        simulate(&model, &policy, 10, StepRng::new(SEED, STRIDE)).expect("simulation runs");

    use Side::{Left as L, Right as R};
    use TigerAction::{Listen, Right as OpenRight};
    // (tiger before, action, observation, reward, tiger after, P(tiger left) after update)
    let expected = [
        (L, Listen, R, -1.0, L, 0.15),
        (L, Listen, L, -1.0, L, 0.5),
        (L, Listen, L, -1.0, L, 0.85),
        (L, Listen, L, -1.0, L, 0.969_798_657_718_120_8),
        (L, OpenRight, R, 10.0, L, 0.5),
        (L, Listen, L, -1.0, L, 0.85),
        (L, Listen, L, -1.0, L, 0.969_798_657_718_120_8),
        (L, OpenRight, L, 10.0, R, 0.5),
        (R, Listen, L, -1.0, R, 0.85),
        (R, Listen, R, -1.0, R, 0.5),
    ];

    assert_eq!(outcome.steps.len(), expected.len());
    for (step, (tiger, action, heard, reward, next, p_left)) in
        outcome.steps.iter().zip(expected)
    {
        assert_eq!(step.state, TigerState::new(tiger), "state at t={}", step.t);
        assert_eq!(step.action, action, "action at t={}", step.t);
        assert_eq!(step.observation, heard, "observation at t={}", step.t);
        assert_eq!(step.reward, reward, "reward at t={}", step.t);
        assert_eq!(step.next_state, TigerState::new(next), "next at t={}", step.t);
        assert!(
            (step.belief.probability(0) - p_left).abs() < 1e-12,
            "belief at t={}: {:?}",
            step.t,
            step.belief
        );
    }

    assert_eq!(outcome.total_reward, 12.0);
    assert!((outcome.discounted_reward - 8.616_017_791_798_825).abs() < 1e-9);
    assert_eq!(outcome.end, RunEnd::StepLimitReached);
}
