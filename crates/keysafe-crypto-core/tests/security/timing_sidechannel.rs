//! Timing side-channel check for the verifier comparison.
//!
//! Uses Welch's t-test to compare the time `constant_time_eq` takes on
//! equal inputs (class A) against inputs that differ in the first byte
//! (class B). An early-exit comparison would make class B measurably
//! faster. |t| > 4.5 would indicate leakage at >99.999% confidence.
//!
//! This is a statistical test and scheduler noise can trip it, so it is
//! ignored by default. Run it with `--ignored` on a quiet machine.

use std::time::Instant;

use keysafe_crypto_core::kdf::constant_time_eq;

const SAMPLES: usize = 10_000;

const T_THRESHOLD: f64 = 4.5;

/// Length of the compared buffers; long enough that an early exit would
/// dominate timer resolution.
const INPUT_LEN: usize = 4096;

#[inline(never)]
fn black_box_compare(a: &[u8], b: &[u8]) -> bool {
    std::hint::black_box(constant_time_eq(std::hint::black_box(a), std::hint::black_box(b)))
}

/// `t = (mean_a - mean_b) / sqrt(var_a/n_a + var_b/n_b)`
#[allow(clippy::cast_precision_loss)]
fn welch_t_statistic(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return f64::NAN;
    }
    let n_a = a.len() as f64;
    let n_b = b.len() as f64;

    let mean_a: f64 = a.iter().sum::<f64>() / n_a;
    let mean_b: f64 = b.iter().sum::<f64>() / n_b;

    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum::<f64>() / (n_a - 1.0);
    let var_b: f64 = b.iter().map(|x| (x - mean_b).powi(2)).sum::<f64>() / (n_b - 1.0);

    let denominator = (var_a / n_a + var_b / n_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    (mean_a - mean_b) / denominator
}

#[test]
#[ignore = "statistical timing test, run explicitly on an idle machine"]
fn verifier_comparison_has_no_early_exit() {
    let stored = vec![0x3Cu8; INPUT_LEN];
    let matching = stored.clone();
    let mut mismatching = stored.clone();
    mismatching[0] ^= 0xFF;

    for _ in 0..100 {
        black_box_compare(&stored, &matching);
        black_box_compare(&stored, &mismatching);
    }

    let mut times_a = Vec::with_capacity(SAMPLES);
    let mut times_b = Vec::with_capacity(SAMPLES);
    for _ in 0..SAMPLES {
        let start = Instant::now();
        let _ = black_box_compare(&stored, &matching);
        let elapsed_a = start.elapsed().as_nanos();

        let start = Instant::now();
        let _ = black_box_compare(&stored, &mismatching);
        let elapsed_b = start.elapsed().as_nanos();

        #[allow(clippy::cast_precision_loss)]
        {
            times_a.push(elapsed_a as f64);
            times_b.push(elapsed_b as f64);
        }
    }

    let abs_t = welch_t_statistic(&times_a, &times_b).abs();
    eprintln!("verifier timing: |t| = {abs_t:.2} (threshold {T_THRESHOLD})");
    assert!(
        abs_t < T_THRESHOLD,
        "timing difference detected: |t| = {abs_t:.2}"
    );
}

#[test]
fn welch_t_test_identical_distributions() {
    let a = vec![1.0; 100];
    let b = vec![1.0; 100];
    assert!(welch_t_statistic(&a, &b).abs() < 0.001);
}

#[test]
fn welch_t_test_different_distributions() {
    let a: Vec<f64> = (0..1000).map(|i| 100.0 + f64::from(i % 3)).collect();
    let b: Vec<f64> = (0..1000).map(|i| 200.0 + f64::from(i % 3)).collect();
    assert!(welch_t_statistic(&a, &b).abs() > 100.0);
}
