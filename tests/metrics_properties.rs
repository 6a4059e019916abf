//! Metrics engine property tests.

use net_trainer_rs::metrics::{AverageKind, Metrics, MetricsKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn one_hot(dims: usize, hot: usize) -> Vec<f64> {
    let mut v = vec![0.0; dims];
    v[hot] = 1.0;
    v
}

/// Raw prediction whose arg-max lands on `hot`.
fn prediction(dims: usize, hot: usize) -> Vec<f64> {
    let mut v = vec![0.1; dims];
    v[hot] = 0.9;
    v
}

#[test]
fn test_diagonal_confusion_matches_tp_total() {
    let mut metrics = Metrics::classification(false);
    let pairs = [(0usize, 0usize), (1, 1), (2, 2), (1, 2), (0, 1), (2, 2)];
    for (actual, predicted) in pairs {
        metrics
            .report(
                &vec![prediction(3, predicted)],
                &vec![one_hot(3, actual)],
            )
            .unwrap();
    }

    let stats = metrics.classification_stats_ref().unwrap();
    let diagonal: u64 = (0..3).map(|f| stats.confusion(f, f)).sum();
    assert_eq!(diagonal, stats.tp_total());
}

#[test]
fn test_micro_equals_macro_on_uniform_dataset() {
    let mut metrics = Metrics::classification(false);
    // Perfectly balanced correct predictions across both features.
    for _ in 0..5 {
        metrics
            .report(&vec![prediction(2, 0)], &vec![one_hot(2, 0)])
            .unwrap();
        metrics
            .report(&vec![prediction(2, 1)], &vec![one_hot(2, 1)])
            .unwrap();
    }

    metrics.set_average_kind(AverageKind::Macro);
    let macro_accuracy = metrics.accuracy().unwrap();
    metrics.set_average_kind(AverageKind::Micro);
    let micro_accuracy = metrics.accuracy().unwrap();
    assert!((macro_accuracy - micro_accuracy).abs() < 1e-12);
}

#[test]
fn test_macro_f1_reference_scenario() {
    // Build feature 0 with TP=3, FP=1, FN=1 and feature 1 with TP=2,
    // FP=0, FN=2. A third class absorbs the misses that would otherwise
    // pollute features 0 and 1; its own precision/recall are undefined or
    // zero, so macro averaging skips it for F1.
    let mut metrics = Metrics::classification(false);
    let reports = [
        (0, 0), // correct on feature 0
        (0, 0),
        (0, 0),
        (1, 0), // FP on 0, first FN on 1
        (1, 2), // second FN on 1
        (0, 2), // FN on 0
        (1, 1), // correct on feature 1
        (1, 1),
    ];
    for (actual, predicted) in reports {
        metrics
            .report(&vec![prediction(3, predicted)], &vec![one_hot(3, actual)])
            .unwrap();
    }

    let stats = metrics.classification_stats_ref().unwrap();
    assert_eq!((stats.tp(0), stats.fp(0), stats.fn_(0)), (3, 1, 1));
    assert_eq!((stats.tp(1), stats.fp(1), stats.fn_(1)), (2, 0, 2));

    // P0 = R0 = 0.75 → F1 = 0.75. P1 = 1, R1 = 0.5 → F1 = 2/3.
    let f1 = metrics.f1_score().unwrap();
    let expected = (0.75 + 2.0 / 3.0) / 2.0;
    assert!((f1 - expected).abs() < 1e-9);
    assert!((f1 - 0.7083).abs() < 1e-3);
}

#[test]
fn test_history_retention_over_two_thousand_iterations() {
    let mut metrics = Metrics::regression().with_history_capacity(1000);
    for iteration in 1..=2000u64 {
        metrics.report_error(0.5).unwrap();
        metrics.store_and_reset(iteration);
    }
    let history = metrics.history();
    assert!(history.len() <= 1000);
    let latest = *history.keys().next_back().unwrap();
    let oldest = *history.keys().next().unwrap();
    assert_eq!(latest, 2000);
    assert!(oldest >= latest - 1000 + 1);
}

#[test]
fn test_regression_scalar_reference_scenario() {
    let mut metrics = Metrics::regression();
    for error in [0.1, 0.2, 0.3] {
        metrics.report_error(error).unwrap();
    }
    assert!((metrics.mean_absolute_error().unwrap() - 0.2).abs() < 1e-12);
    let expected_rmse = (0.14f64 / 3.0).sqrt();
    assert!((metrics.rmse().unwrap() - expected_rmse).abs() < 1e-12);
}

#[test]
fn test_r2_round_trip_with_undefined_sentinel() {
    let mut metrics = Metrics::regression();
    for value in [1.0, 2.0, 3.0] {
        metrics
            .report(&vec![vec![value]], &vec![vec![value]])
            .unwrap();
    }
    assert!((metrics.r2().unwrap().unwrap() - 1.0).abs() < 1e-12);

    // Constant actuals: SS_tot == 0 must yield the undefined sentinel.
    let mut constant = Metrics::regression();
    constant
        .report(
            &vec![vec![5.0], vec![5.0]],
            &vec![vec![5.0], vec![5.0]],
        )
        .unwrap();
    assert!(constant.r2().unwrap().is_none());
}

#[test]
fn test_moving_average_trend_query() {
    let mut metrics = Metrics::regression();
    for (iteration, error) in [(1u64, 0.9), (2, 0.6), (3, 0.3)] {
        metrics.report_error(error).unwrap();
        metrics.store_and_reset(iteration);
    }
    let trend = metrics.moving_average(3);
    assert!((trend[&3] - 0.3).abs() < 1e-12);
    assert!((trend[&2] - (0.9 * 0.3 + 0.1 * 0.6)).abs() < 1e-12);
    assert!((trend[&1] - (0.9 * trend[&2] + 0.1 * 0.9)).abs() < 1e-12);
}

#[test]
fn test_average_matches_manual_mean_on_random_history() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut metrics = Metrics::regression().with_history_capacity(64);
    let mut errors = Vec::new();
    for iteration in 0..64u64 {
        let error = rng.gen_range(0.0..1.0);
        errors.push(error);
        metrics.report_error(error).unwrap();
        metrics.store_and_reset(iteration);
    }
    let manual: f64 = errors[errors.len() - 16..].iter().sum::<f64>() / 16.0;
    assert!((metrics.average(16) - manual).abs() < 1e-12);
}

#[test]
fn test_reference_mirrors_configuration() {
    let metrics = Metrics::classification(true).with_average(AverageKind::Micro);
    let mirror = metrics.reference();
    assert_eq!(mirror.kind(), MetricsKind::Classification);
    assert_eq!(mirror.average_kind(), AverageKind::Micro);
    assert!(mirror.multi_label());
    assert_eq!(mirror.error_count(), 0);
}

#[test]
fn test_multi_label_threshold_classification() {
    let mut metrics = Metrics::classification(true);
    // Both entries at or above 0.5 are positive.
    metrics
        .report(&vec![vec![0.6, 0.5, 0.4]], &vec![vec![1.0, 0.0, 0.0]])
        .unwrap();
    let stats = metrics.classification_stats_ref().unwrap();
    assert_eq!(stats.tp(0), 1);
    assert_eq!(stats.fp(1), 1);
    assert_eq!(stats.tn(2), 1);
}

#[test]
fn test_single_label_tie_counts_both_features() {
    let mut metrics = Metrics::classification(false);
    // Tied maxima on features 0 and 1 both classify positive.
    metrics
        .report(&vec![vec![0.8, 0.8, 0.1]], &vec![vec![1.0, 0.0, 0.0]])
        .unwrap();
    let stats = metrics.classification_stats_ref().unwrap();
    assert_eq!(stats.tp(0), 1);
    assert_eq!(stats.fp(1), 1);
}
