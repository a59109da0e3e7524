// autoenc-core/tests/rate_match_tests.rs

use autoenc_core::config::RateMatchConfig;
use autoenc_core::error::CoreError;
use autoenc_core::processing::RateMatcher;

fn qualities(probes: &[autoenc_core::processing::ProbeResult]) -> Vec<f64> {
    probes.iter().map(|p| p.quality).collect()
}

#[test]
fn test_brackets_then_interpolates() {
    let matcher = RateMatcher::new(4000, RateMatchConfig::default());
    let result = matcher
        .search(|q| {
            Ok(match q {
                q if q == 20.0 => 8000,
                q if q == 25.0 => 6000,
                q if q == 30.0 => 3000,
                _ => 4020,
            })
        })
        .unwrap();

    // 25 -> 6000 and 30 -> 3000 put 4000 at crf 28.33; 28.3 is the closest tenth
    assert_eq!(qualities(&result.probes), vec![20.0, 25.0, 30.0, 28.3]);
    assert_eq!(result.quality, 28.3);
    assert!(result.converged);
}

#[test]
fn test_exhausted_budget_returns_last_probe() {
    let matcher = RateMatcher::new(4000, RateMatchConfig::default());
    let result = matcher.search(|_| Ok(10_000)).unwrap();

    assert_eq!(qualities(&result.probes), vec![20.0, 25.0, 30.0, 35.0]);
    assert_eq!(result.quality, 35.0);
    assert!(!result.converged);
}

#[test]
fn test_stops_at_quality_ceiling() {
    let config = RateMatchConfig {
        max_quality: 30.0,
        max_probes: 10,
        ..RateMatchConfig::default()
    };
    let result = RateMatcher::new(4000, config)
        .search(|_| Ok(10_000))
        .unwrap();

    assert_eq!(qualities(&result.probes), vec![20.0, 25.0, 30.0]);
    assert_eq!(result.quality, 30.0);
    assert!(!result.converged);
}

#[test]
fn test_probe_error_propagates() {
    let matcher = RateMatcher::new(4000, RateMatchConfig::default());
    let result = matcher.search(|_| Err(CoreError::Cancelled));
    assert!(matches!(result, Err(CoreError::Cancelled)));
}
