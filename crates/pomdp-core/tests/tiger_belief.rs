use pomdp_core::belief::{Belief, BeliefError, BeliefMetrics};
use pomdp_core::distribution::WEIGHT_TOLERANCE;
use pomdp_core::model::{Pomdp, validate};
use pomdp_core::problems::{Side, TigerAction, TigerConfig, TigerPomdp};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn tiger() -> TigerPomdp {
    TigerPomdp::new(TigerConfig::default()).expect("valid model")
}

fn initial_belief(model: &TigerPomdp) -> Belief {
    Belief::from_distribution(model, &model.initial_state()).expect("declared states")
}

#[test]
fn default_tiger_passes_validation() {
    validate(&tiger()).expect("complete model");
}

#[test]
fn repeated_listening_sharpens_the_belief() {
    let model = tiger();
    let start = initial_belief(&model);
    assert_eq!(start.as_slice(), &[0.5, 0.5]);

    let once = start
        .update(&model, &TigerAction::Listen, &Side::Left)
        .expect("possible observation");
    assert!((once.probability(0) - 0.85).abs() < 1e-12);

    let twice = once
        .update(&model, &TigerAction::Listen, &Side::Left)
        .expect("possible observation");
    let expected = 0.85 * 0.85 / (0.85 * 0.85 + 0.15 * 0.15);
    assert!((twice.probability(0) - expected).abs() < 1e-12);

    // Conflicting evidence cancels out.
    let back = twice
        .update(&model, &TigerAction::Listen, &Side::Right)
        .expect("possible observation");
    assert!((back.probability(0) - 0.85).abs() < 1e-12);
    assert!(
        BeliefMetrics::from_belief(&back).entropy < BeliefMetrics::from_belief(&start).entropy
    );
}

#[test]
fn opening_a_door_resets_to_uniform() {
    let model = tiger();
    let confident = Belief::from_weights(vec![0.97, 0.03]).expect("valid");
    for door in [TigerAction::Left, TigerAction::Right] {
        for heard in Side::ALL {
            let next = confident
                .update(&model, &door, &heard)
                .expect("noise observation is always possible");
            assert!((next.probability(0) - 0.5).abs() < 1e-12, "{door} {heard}");
        }
    }
}

#[test]
fn perfect_sensor_contradiction_collapses() {
    let config = TigerConfig {
        listen_accuracy: 1.0,
        ..TigerConfig::default()
    };
    let model = TigerPomdp::new(config).expect("valid model");
    let certain_left = Belief::point(2, 0).expect("in range");
    let err = certain_left
        .update(&model, &TigerAction::Listen, &Side::Right)
        .expect_err("a perfect sensor cannot report the other side");
    assert_eq!(
        err,
        BeliefError::Collapse {
            action: "Listen".to_string(),
            observation: "Right".to_string(),
        }
    );
}

#[test]
fn filtered_beliefs_stay_normalized() {
    use rand::Rng;

    let model = tiger();
    let mut rng = StdRng::seed_from_u64(17);
    let mut belief = initial_belief(&model);
    for _ in 0..500 {
        let action = TigerAction::ALL[rng.gen_range(0..TigerAction::ALL.len())];
        let heard = Side::ALL[rng.gen_range(0..Side::ALL.len())];
        belief = belief
            .update(&model, &action, &heard)
            .expect("noisy sensor never collapses");
        assert!(belief.is_normalized(WEIGHT_TOLERANCE));
        assert!(belief.as_slice().iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
