// ============================================================================
// autoenc-core/src/processing/rate_match.rs
// ============================================================================
//
// RATE MATCHING: Bounded search for the crf that hits a target bitrate
//
// Each iteration runs a short probe encode and reads back its bitrate. The
// first probe uses the initial quality; the second steps by a fixed amount in
// the direction of the target. From then on the search interpolates
// piecewise-linearly when the history brackets the target and extends the
// probed range by one step when it does not. The search never fails for lack
// of convergence: after the probe budget it returns the last probed quality.
//
// Quality values are handled in tenths internally so that "already probed"
// comparisons are exact.

use crate::config::RateMatchConfig;
use crate::error::CoreResult;

/// Outcome of one probe encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub quality: f64,
    pub bitrate_kbps: u64,
}

/// Result of a bitrate search.
#[derive(Debug, Clone, PartialEq)]
pub struct RateMatch {
    /// Quality to use for the full encode
    pub quality: f64,
    /// Whether the chosen quality's probe landed within tolerance
    pub converged: bool,
    /// Every probe in the order it ran
    pub probes: Vec<ProbeResult>,
}

/// Searches for the quality parameter that reproduces a target bitrate.
#[derive(Debug, Clone)]
pub struct RateMatcher {
    target_kbps: u64,
    config: RateMatchConfig,
}

fn to_tenths(quality: f64) -> i64 {
    (quality * 10.0).round() as i64
}

fn from_tenths(tenths: i64) -> f64 {
    tenths as f64 / 10.0
}

impl RateMatcher {
    pub fn new(target_kbps: u64, config: RateMatchConfig) -> Self {
        Self {
            target_kbps,
            config,
        }
    }

    #[must_use]
    pub fn target_kbps(&self) -> u64 {
        self.target_kbps
    }

    /// `|bitrate - target| < target / 10`
    #[must_use]
    pub fn within_tolerance(&self, bitrate_kbps: u64) -> bool {
        let target = self.target_kbps as f64;
        (bitrate_kbps as f64 - target).abs() < target / 10.0
    }

    /// Rounds to one decimal and clamps into the encoder's quality range.
    fn normalize(&self, quality: f64) -> i64 {
        let clamped = quality.clamp(self.config.min_quality, self.config.max_quality);
        to_tenths(clamped)
    }

    /// Runs the search. `probe` encodes the probe window at the given quality
    /// and returns the achieved bitrate in kbps; its errors propagate.
    pub fn search<F>(&self, mut probe: F) -> CoreResult<RateMatch>
    where
        F: FnMut(f64) -> CoreResult<u64>,
    {
        let mut history: Vec<ProbeResult> = Vec::with_capacity(self.config.max_probes);
        let mut quality = self.normalize(self.config.initial_quality);

        for probe_num in 1..=self.config.max_probes {
            let q = from_tenths(quality);
            let bitrate_kbps = probe(q)?;
            history.push(ProbeResult {
                quality: q,
                bitrate_kbps,
            });
            log::debug!(
                "Probe {probe_num}/{}: crf {q} -> {bitrate_kbps} kbps (target {} kbps)",
                self.config.max_probes,
                self.target_kbps
            );

            if self.within_tolerance(bitrate_kbps) {
                return Ok(RateMatch {
                    quality: q,
                    converged: true,
                    probes: history,
                });
            }

            if probe_num == self.config.max_probes {
                break;
            }

            let Some(next) = self.propose(&history) else {
                log::debug!("No unprobed quality left to try, stopping early");
                break;
            };
            if history.iter().any(|p| to_tenths(p.quality) == next) {
                log::debug!(
                    "Next quality {} was already probed (range limit), stopping early",
                    from_tenths(next)
                );
                break;
            }
            quality = next;
        }

        Ok(RateMatch {
            quality: from_tenths(quality),
            converged: false,
            probes: history,
        })
    }

    /// Next quality (in tenths) to probe, or `None` when interpolation has no
    /// unprobed sample left.
    fn propose(&self, history: &[ProbeResult]) -> Option<i64> {
        let target = self.target_kbps;
        let step = self.config.quality_step;

        let first = history.first()?;
        if history.len() == 1 {
            let next = if first.bitrate_kbps > target {
                first.quality + step
            } else {
                first.quality - step
            };
            return Some(self.normalize(next));
        }

        let min_rate = history.iter().map(|p| p.bitrate_kbps).min()?;
        let max_rate = history.iter().map(|p| p.bitrate_kbps).max()?;

        if min_rate < target && target < max_rate {
            return interpolate(history, target);
        }

        let min_q = history.iter().map(|p| p.quality).fold(f64::INFINITY, f64::min);
        let max_q = history
            .iter()
            .map(|p| p.quality)
            .fold(f64::NEG_INFINITY, f64::max);

        // Every probe overshoots: raise crf. Every probe undershoots: lower it.
        let next = if target < min_rate {
            max_q + step
        } else {
            min_q - step
        };
        Some(self.normalize(next))
    }
}

/// Resamples the piecewise-linear interpolant of `(quality, bitrate)` at 0.1
/// steps over the probed range and returns the unprobed sample closest to
/// `target`. Ties go to the smaller quality.
fn interpolate(history: &[ProbeResult], target: u64) -> Option<i64> {
    let mut points: Vec<(i64, f64)> = history
        .iter()
        .map(|p| (to_tenths(p.quality), p.bitrate_kbps as f64))
        .collect();
    points.sort_by_key(|(q, _)| *q);
    points.dedup_by_key(|(q, _)| *q);

    let lo = points.first()?.0;
    let hi = points.last()?.0;
    let target = target as f64;

    let mut best: Option<(i64, f64)> = None;
    for sample in lo..=hi {
        if points.iter().any(|(q, _)| *q == sample) {
            continue;
        }
        let Some(rate) = evaluate(&points, sample) else {
            continue;
        };
        let distance = (rate - target).abs();
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((sample, distance));
        }
    }

    best.map(|(q, _)| q)
}

/// Linear interpolation between the two points surrounding `q`.
fn evaluate(points: &[(i64, f64)], q: i64) -> Option<f64> {
    points.windows(2).find_map(|pair| {
        let (q0, r0) = pair[0];
        let (q1, r1) = pair[1];
        if q0 <= q && q <= q1 {
            let t = (q - q0) as f64 / (q1 - q0) as f64;
            Some(r0 + t * (r1 - r0))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::collections::HashSet;

    fn matcher(target: u64) -> RateMatcher {
        RateMatcher::new(target, RateMatchConfig::default())
    }

    /// Bitrate model that falls as crf rises, roughly like x264.
    fn model(q: f64) -> u64 {
        (20_000.0 * (-0.08 * q).exp()) as u64
    }

    #[test]
    fn test_tolerance_is_strict() {
        let m = matcher(4000);
        assert!(m.within_tolerance(4000));
        assert!(m.within_tolerance(4399));
        assert!(!m.within_tolerance(4400));
        assert!(!m.within_tolerance(3600));
        assert!(m.within_tolerance(3601));
    }

    #[test]
    fn test_stops_on_first_probe_within_tolerance() {
        let mut calls = 0;
        let result = matcher(4000)
            .search(|_| {
                calls += 1;
                Ok(4100)
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert!(result.converged);
        assert_eq!(result.quality, 20.0);
    }

    #[test]
    fn test_second_probe_steps_towards_target() {
        // Overshoot raises crf
        let mut seen = Vec::new();
        let _ = matcher(1000).search(|q| {
            seen.push(q);
            Ok(9000)
        });
        assert_eq!(seen[1], 25.0);

        // Undershoot lowers crf
        let mut seen = Vec::new();
        let _ = matcher(50_000).search(|q| {
            seen.push(q);
            Ok(100)
        });
        assert_eq!(seen[1], 15.0);
    }

    #[test]
    fn test_interpolates_between_bracketing_probes() {
        let m = matcher(4000);
        let history = [
            ProbeResult { quality: 18.0, bitrate_kbps: 5200 },
            ProbeResult { quality: 25.0, bitrate_kbps: 3100 },
        ];

        let next = from_tenths(m.propose(&history).unwrap());
        assert!(next > 18.0 && next < 25.0);

        // No other 0.1 sample in range lands closer to the target
        let rate_at = |q: f64| 5200.0 + (q - 18.0) / 7.0 * (3100.0 - 5200.0);
        let chosen = (rate_at(next) - 4000.0).abs();
        for tenths in 181..250 {
            let q = tenths as f64 / 10.0;
            assert!(chosen <= (rate_at(q) - 4000.0).abs() + 1e-9);
        }
        assert_eq!(next, 22.0);
    }

    #[test]
    fn test_extends_when_not_bracketed() {
        let m = matcher(1000);
        let history = [
            ProbeResult { quality: 20.0, bitrate_kbps: 6000 },
            ProbeResult { quality: 25.0, bitrate_kbps: 4000 },
        ];
        assert_eq!(m.propose(&history), Some(300));

        let m = matcher(10_000);
        let history = [
            ProbeResult { quality: 20.0, bitrate_kbps: 6000 },
            ProbeResult { quality: 15.0, bitrate_kbps: 8000 },
        ];
        assert_eq!(m.propose(&history), Some(100));
    }

    #[test]
    fn test_terminates_within_budget_without_repeats() {
        for target in [300, 1500, 4000, 9000, 15_000, 60_000] {
            let mut probed = Vec::new();
            let result = matcher(target)
                .search(|q| {
                    probed.push(to_tenths(q));
                    Ok(model(q))
                })
                .unwrap();

            assert!(probed.len() <= 4, "target {target}: {probed:?}");
            let unique: HashSet<_> = probed.iter().collect();
            assert_eq!(unique.len(), probed.len(), "target {target}: {probed:?}");
            assert_eq!(result.probes.len(), probed.len());
            assert_eq!(to_tenths(result.quality), *probed.last().unwrap());
        }
    }

    #[test]
    fn test_budget_exhausted_returns_last_probe() {
        let result = matcher(100).search(|_| Ok(50_000)).unwrap();
        assert!(!result.converged);
        let qualities: Vec<f64> = result.probes.iter().map(|p| p.quality).collect();
        assert_eq!(qualities, vec![20.0, 25.0, 30.0, 35.0]);
        assert_eq!(result.quality, 35.0);
    }

    #[test]
    fn test_clamping_stops_early() {
        let config = RateMatchConfig {
            initial_quality: 50.0,
            ..RateMatchConfig::default()
        };
        let result = RateMatcher::new(100, config).search(|_| Ok(50_000)).unwrap();

        let qualities: Vec<f64> = result.probes.iter().map(|p| p.quality).collect();
        assert_eq!(qualities, vec![50.0, 51.0]);
        assert!(!result.converged);
        assert_eq!(result.quality, 51.0);
    }

    #[test]
    fn test_probe_errors_propagate() {
        let result = matcher(4000).search(|_| Err(CoreError::OperationFailed("x264 died".into())));
        assert!(matches!(result, Err(CoreError::OperationFailed(_))));
    }

    #[test]
    fn test_converges_on_smooth_model() {
        let result = matcher(4000).search(|q| Ok(model(q))).unwrap();
        assert!(result.converged);
        assert!(matcher(4000).within_tolerance(model(result.quality)));
    }
}
