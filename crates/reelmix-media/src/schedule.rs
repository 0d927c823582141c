//! Insertion schedule for showcase overlays.
//!
//! Overlays start every `interval` seconds and a final overlay is always
//! placed so that it ends flush with the primary clip. Timestamps are kept at
//! millisecond precision.

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Guard against interval/duration ratios that would exhaust memory.
pub const MAX_CANDIDATES: usize = 1_000_000;

/// Raw candidates closer than this collapse into one insertion point.
const DEDUP_TOLERANCE_SECS: f64 = 0.0005;

/// Ordered, strictly ascending insertion timestamps in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule(Vec<f64>);

impl Schedule {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

/// Round to millisecond precision.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Compute where showcase overlays begin on a primary clip of `duration` seconds.
///
/// Fails with [`MediaError::InvalidConfig`] for a non-positive interval or
/// insert length, or a non-finite or non-positive duration. An interval so small
/// against the duration that the schedule cannot advance, or would exceed
/// [`MAX_CANDIDATES`] points, is also rejected.
pub fn compute_schedule(duration: f64, interval: f64, insert_len: f64) -> MediaResult<Schedule> {
    if !interval.is_finite() || interval <= 0.0 {
        return Err(MediaError::invalid_config(format!(
            "interval must be positive, got {}",
            interval
        )));
    }
    if !insert_len.is_finite() || insert_len <= 0.0 {
        return Err(MediaError::invalid_config(format!(
            "insert length must be positive, got {}",
            insert_len
        )));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaError::invalid_config(format!(
            "duration must be positive and finite, got {}",
            duration
        )));
    }

    let last_start = duration - insert_len;
    let mut candidates = Vec::new();

    let mut t = interval;
    while t < last_start {
        let next = t + interval;
        if next <= t || candidates.len() >= MAX_CANDIDATES {
            return Err(MediaError::invalid_config(format!(
                "interval {} is too small for duration {}",
                interval, duration
            )));
        }
        candidates.push(t);
        t = next;
    }

    // Final overlay ends flush with the clip, or starts at 0 for short clips.
    candidates.push(last_start.max(0.0));

    Ok(Schedule(collapse(candidates)))
}

/// Merge near-identical candidates, round to milliseconds and sort.
///
/// When two candidates merge the later one wins, which keeps the flush-to-end
/// point intact.
fn collapse(mut candidates: Vec<f64>) -> Vec<f64> {
    candidates.sort_by(f64::total_cmp);

    let mut merged: Vec<f64> = Vec::with_capacity(candidates.len());
    for t in candidates {
        match merged.last_mut() {
            Some(last) if t - *last <= DEDUP_TOLERANCE_SECS => *last = t,
            _ => merged.push(t),
        }
    }

    let mut rounded: Vec<f64> = merged.into_iter().map(round3).collect();
    rounded.dedup_by(|a, b| a == b);
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(duration: f64, interval: f64, insert_len: f64) -> Vec<f64> {
        compute_schedule(duration, interval, insert_len)
            .unwrap()
            .into_vec()
    }

    #[test]
    fn test_regular_spacing_with_flush_point() {
        assert_eq!(schedule(20.0, 7.0, 3.0), vec![7.0, 14.0, 17.0]);
    }

    #[test]
    fn test_flush_point_equals_first_interval() {
        assert_eq!(schedule(10.0, 7.0, 3.0), vec![7.0]);
    }

    #[test]
    fn test_clip_shorter_than_insert() {
        assert_eq!(schedule(2.0, 7.0, 3.0), vec![0.0]);
        assert_eq!(schedule(3.0, 7.0, 3.0), vec![0.0]);
    }

    #[test]
    fn test_flush_point_close_to_interior_point_collapses() {
        // Interior 7.0 and flush 7.0004 are within half a millisecond.
        assert_eq!(schedule(10.0004, 7.0, 3.0), vec![7.0]);
        // 0.6 ms apart: both survive at millisecond precision.
        assert_eq!(schedule(10.0006, 7.0, 3.0), vec![7.0, 7.001]);
    }

    #[test]
    fn test_rounds_to_milliseconds() {
        let s = schedule(12.34567, 5.0, 3.0);
        assert_eq!(s, vec![5.0, 9.346]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            compute_schedule(20.0, 0.0, 3.0),
            Err(MediaError::InvalidConfig(_))
        ));
        assert!(matches!(
            compute_schedule(20.0, 7.0, -1.0),
            Err(MediaError::InvalidConfig(_))
        ));
        assert!(matches!(
            compute_schedule(f64::NAN, 7.0, 3.0),
            Err(MediaError::InvalidConfig(_))
        ));
        assert!(matches!(
            compute_schedule(f64::INFINITY, 7.0, 3.0),
            Err(MediaError::InvalidConfig(_))
        ));
        assert!(matches!(
            compute_schedule(0.0, 7.0, 3.0),
            Err(MediaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_long_primary_at_defaults() {
        // Two and a quarter hours at the default 7s/3s timing.
        let s = schedule(8100.0, 7.0, 3.0);
        assert_eq!(s.len(), 1157);
        assert_eq!(s[0], 7.0);
        assert_eq!(*s.last().unwrap(), round3(8097.0));
        assert!(s.windows(2).all(|w| w[0] < w[1]));

        let dense = schedule(3600.0, 0.5, 0.25);
        assert_eq!(*dense.last().unwrap(), 3599.75);
    }

    #[test]
    fn test_interval_too_small_to_advance() {
        assert!(matches!(
            compute_schedule(1.0e12, 1.0e-6, 1.0),
            Err(MediaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_schedule_invariants_hold_across_inputs() {
        let durations = [0.5, 3.0, 3.001, 4.2, 10.0, 17.5, 60.0, 123.456, 600.0];
        let intervals = [0.9, 2.5, 3.0, 7.0, 11.3];
        let insert_lens = [0.5, 1.0, 3.0, 4.75];

        for &duration in &durations {
            for &interval in &intervals {
                for &insert_len in &insert_lens {
                    let s = schedule(duration, interval, insert_len);
                    assert!(!s.is_empty());
                    assert!(s.windows(2).all(|w| w[0] < w[1]), "not ascending: {:?}", s);
                    assert!(s.iter().all(|&t| (0.0..=duration).contains(&t)));
                    assert_eq!(
                        *s.last().unwrap(),
                        round3((duration - insert_len).max(0.0)),
                        "duration={} interval={} insert_len={}",
                        duration,
                        interval,
                        insert_len
                    );
                    if duration <= insert_len {
                        assert_eq!(s, vec![0.0]);
                    }
                }
            }
        }
    }
}
