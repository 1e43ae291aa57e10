use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear VU target curve over consecutive stages, starting at 0.
///
/// The integer target is the ceiling of the exact curve, so a VU is active
/// for as long as any fraction of it is demanded.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

struct Segment {
    index: usize,
    start: Duration,
    duration: Duration,
    from: u64,
    to: u64,
}

impl RampSchedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            stages,
            cumulative_ends,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    pub fn max_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    fn segment_at(&self, elapsed: Duration) -> Option<Segment> {
        if self.stages.is_empty() {
            return None;
        }

        let idx = if elapsed >= self.total_duration() {
            self.stages.len() - 1
        } else {
            // First stage whose end lies strictly after `elapsed`, so a
            // boundary instant belongs to the stage it starts.
            self.cumulative_ends.partition_point(|end| *end <= elapsed)
        };

        let start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let from = if idx == 0 { 0 } else { self.stages[idx - 1].target };

        Some(Segment {
            index: idx,
            start,
            duration: self.cumulative_ends[idx].saturating_sub(start),
            from,
            to: self.stages[idx].target,
        })
    }

    /// Exact (fractional) target at `elapsed`.
    pub fn target_exact_at(&self, elapsed: Duration) -> f64 {
        let Some(seg) = self.segment_at(elapsed) else {
            return 0.0;
        };
        if elapsed >= self.total_duration() || seg.duration.is_zero() {
            return seg.to as f64;
        }

        let progress = elapsed.saturating_sub(seg.start).as_secs_f64() / seg.duration.as_secs_f64();
        seg.from as f64 + (seg.to as f64 - seg.from as f64) * progress.clamp(0.0, 1.0)
    }

    /// Integer VU target at `elapsed`.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(seg) = self.segment_at(elapsed) else {
            return 0;
        };
        if elapsed >= self.total_duration() || seg.duration.is_zero() {
            return seg.to;
        }

        let from = seg.from as i128;
        let delta = seg.to as i128 - from;
        let num = elapsed.saturating_sub(seg.start).as_nanos() as i128;
        let den = (seg.duration.as_nanos() as i128).max(1);

        // ceil(delta * num / den) for either sign of `delta`.
        let step = -((-delta.saturating_mul(num)).div_euclid(den));
        (from + step).clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        let total = self.total_duration();
        let clamped = elapsed.min(total);
        let seg = self.segment_at(clamped)?;

        let stage_elapsed = clamped.saturating_sub(seg.start).min(seg.duration);
        Some(StageSnapshot {
            index: seg.index,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: seg.duration.saturating_sub(stage_elapsed),
            start_target: seg.from,
            end_target: seg.to,
            current_target: self.target_at(clamped),
        })
    }
}
