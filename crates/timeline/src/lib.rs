//! Clock-explicit animation timeline engine.
//!
//! A [`Program`] describes a scalar value over time: an optional initial
//! delay, a chain of eased segments, an optional per-cycle delay, and a
//! repeat policy with optional auto-reverse. [`Timelines`] is the registry
//! that owns running programs; callers advance it explicitly with
//! [`Timelines::advance`] and receive finished programs as [`Completion`]
//! values, so the whole engine can be driven by fabricated `Instant`s in
//! tests instead of a live timer.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::trace;

/// Easing applied across one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Linear,
    /// Quadratic ease-in/ease-out.
    EaseInOut,
    Smoothstep,
    /// Smoother keyframe spline (zero first and second derivative at the ends).
    Spline,
}

impl Curve {
    pub fn sample(self, t: f32) -> f32 {
        let clamped = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => clamped,
            Curve::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
            Curve::EaseInOut => {
                if clamped < 0.5 {
                    2.0 * clamped * clamped
                } else {
                    -1.0 + (4.0 - 2.0 * clamped) * clamped
                }
            }
            Curve::Spline => {
                clamped * clamped * clamped * (clamped * (clamped * 6.0 - 15.0) + 10.0)
            }
        }
    }
}

/// One leg of a program: ramp from the previous value to `to` over `duration`.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub to: f32,
    pub duration: Duration,
    pub curve: Curve,
}

impl Segment {
    pub fn new(to: f32, duration: Duration, curve: Curve) -> Self {
        Self {
            to,
            duration,
            curve,
        }
    }
}

/// How many times the segment chain plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Once,
    Count(u32),
    Forever,
}

/// A complete value-over-time description.
///
/// Sampling is a pure function of `(program, start, now)`:
/// * before `delay` has elapsed the value is `start_value`;
/// * each cycle begins with `cycle_delay` during which the value holds at
///   `start_value`, then plays the segments forward (and backward again when
///   `auto_reverse` is set);
/// * a zero-duration segment contributes its end value for any instant
///   strictly past its start, so at the exact start of the program the value
///   is still `start_value`;
/// * finite programs hold their final value once every repetition is spent.
#[derive(Debug, Clone)]
pub struct Program {
    pub start_value: f32,
    pub delay: Duration,
    pub cycle_delay: Duration,
    pub segments: Vec<Segment>,
    pub repeat: Repeat,
    pub auto_reverse: bool,
}

impl Program {
    /// Single eased ramp from `from` to `to`.
    pub fn ramp(from: f32, to: f32, duration: Duration, curve: Curve) -> Self {
        Self {
            start_value: from,
            delay: Duration::ZERO,
            cycle_delay: Duration::ZERO,
            segments: vec![Segment::new(to, duration, curve)],
            repeat: Repeat::Once,
            auto_reverse: false,
        }
    }

    /// Endless auto-reversing oscillation between `from` and `to`, one way
    /// taking `half_period`.
    pub fn oscillate(from: f32, to: f32, half_period: Duration, curve: Curve) -> Self {
        Self {
            start_value: from,
            delay: Duration::ZERO,
            cycle_delay: Duration::ZERO,
            segments: vec![Segment::new(to, half_period, curve)],
            repeat: Repeat::Forever,
            auto_reverse: true,
        }
    }

    fn repetitions(&self) -> Option<u32> {
        match self.repeat {
            Repeat::Once => Some(1),
            Repeat::Count(n) => Some(n),
            Repeat::Forever => None,
        }
    }

    fn core_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }

    fn cycle_duration(&self) -> Duration {
        let core = self.core_duration();
        let active = if self.auto_reverse { core * 2 } else { core };
        self.cycle_delay + active
    }

    /// Total running time after which the program is finished; `None` for
    /// forever-repeating programs.
    pub fn finish_after(&self) -> Option<Duration> {
        let reps = self.repetitions()?;
        Some(self.delay + self.cycle_duration() * reps)
    }

    fn final_value(&self) -> f32 {
        if self.repetitions() == Some(0) || self.auto_reverse {
            return self.start_value;
        }
        self.segments
            .last()
            .map(|s| s.to)
            .unwrap_or(self.start_value)
    }

    fn forward_value(&self, offset: f32) -> f32 {
        let mut from = self.start_value;
        let mut acc = 0.0f32;
        for seg in &self.segments {
            let d = seg.duration.as_secs_f32();
            if d <= 0.0 {
                if offset > acc {
                    from = seg.to;
                    continue;
                }
                return from;
            }
            if offset < acc + d {
                let t = (offset - acc) / d;
                return from + (seg.to - from) * seg.curve.sample(t);
            }
            from = seg.to;
            acc += d;
        }
        from
    }

    /// Samples the program `elapsed` after its start.
    pub fn value_at(&self, elapsed: Duration) -> f32 {
        if elapsed < self.delay {
            return self.start_value;
        }
        let t = elapsed - self.delay;
        let cycle = self.cycle_duration();
        if let Some(reps) = self.repetitions() {
            if cycle.is_zero() || t >= cycle * reps {
                return self.final_value();
            }
        }
        if cycle.is_zero() {
            return self.final_value();
        }
        let cycle_pos = Duration::from_nanos((t.as_nanos() % cycle.as_nanos()) as u64);
        if cycle_pos < self.cycle_delay {
            return self.start_value;
        }
        let mut offset = (cycle_pos - self.cycle_delay).as_secs_f32();
        let core = self.core_duration().as_secs_f32();
        if self.auto_reverse && offset > core {
            offset = (2.0 * core - offset).max(0.0);
        }
        self.forward_value(offset)
    }
}

/// Opaque handle to a running timeline. Never recycled within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimelineId(u64);

/// Reported exactly once when a finite program runs out of repetitions.
#[derive(Debug, Clone)]
pub struct Completion<T> {
    pub id: TimelineId,
    pub tag: T,
    pub at: Instant,
}

struct Entry<T> {
    program: Program,
    start: Instant,
    tag: T,
    finished: bool,
}

/// Registry of running timelines, advanced explicitly by the caller.
///
/// Finished programs stay registered (holding their final value) until they
/// are [`stop`](Timelines::stop)ped, so owners decide when a handle is
/// released.
pub struct Timelines<T> {
    entries: BTreeMap<TimelineId, Entry<T>>,
    next_id: u64,
}

impl<T> Default for Timelines<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Timelines<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn start(&mut self, program: Program, tag: T, now: Instant) -> TimelineId {
        let id = TimelineId(self.next_id);
        self.next_id += 1;
        trace!(id = id.0, segments = program.segments.len(), "timeline started");
        self.entries.insert(
            id,
            Entry {
                program,
                start: now,
                tag,
                finished: false,
            },
        );
        id
    }

    /// Cancels and removes a timeline. Stale ids are a silent no-op.
    pub fn stop(&mut self, id: TimelineId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            trace!(id = id.0, "timeline stopped");
        }
        removed
    }

    /// Removes every timeline whose tag matches, returning how many went.
    pub fn stop_matching(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !predicate(&entry.tag));
        before - self.entries.len()
    }

    pub fn value(&self, id: TimelineId, now: Instant) -> Option<f32> {
        let entry = self.entries.get(&id)?;
        Some(
            entry
                .program
                .value_at(now.saturating_duration_since(entry.start)),
        )
    }

    /// Instant at which a finite timeline finishes; `None` for unknown ids
    /// and forever-repeating programs.
    pub fn finish_at(&self, id: TimelineId) -> Option<Instant> {
        let entry = self.entries.get(&id)?;
        entry.program.finish_after().map(|d| entry.start + d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: TimelineId) -> bool {
        self.entries.contains_key(&id)
    }
}

impl<T: Clone> Timelines<T> {
    /// Marks every newly finished program and reports each exactly once, in
    /// finish order.
    pub fn advance(&mut self, now: Instant) -> Vec<Completion<T>> {
        let mut completions = Vec::new();
        for (id, entry) in self.entries.iter_mut() {
            if entry.finished {
                continue;
            }
            let Some(total) = entry.program.finish_after() else {
                continue;
            };
            let at = entry.start + total;
            if now >= at {
                entry.finished = true;
                completions.push(Completion {
                    id: *id,
                    tag: entry.tag.clone(),
                    at,
                });
            }
        }
        completions.sort_by_key(|c| (c.at, c.id));
        completions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn linear_curve_increases_monotonically() {
        let curve = Curve::Linear;
        let mut last = 0.0;
        for step in 0..=10 {
            let sample = curve.sample(step as f32 / 10.0);
            assert!(sample >= last - f32::EPSILON);
            last = sample;
        }
    }

    #[test]
    fn smoothstep_matches_expected_values() {
        let curve = Curve::Smoothstep;
        assert!((curve.sample(0.0) - 0.0).abs() < 1e-6);
        assert!((curve.sample(0.5) - 0.5).abs() < 1e-6);
        assert!((curve.sample(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ease_in_out_accelerates_then_decelerates() {
        let curve = Curve::EaseInOut;
        let first = curve.sample(0.25);
        let mid = curve.sample(0.5);
        let last = curve.sample(0.75);
        assert!(first < mid);
        assert!(last > mid);
    }

    #[test]
    fn spline_pins_endpoints_and_midpoint() {
        let curve = Curve::Spline;
        assert!((curve.sample(0.0) - 0.0).abs() < 1e-6);
        assert!((curve.sample(0.5) - 0.5).abs() < 1e-6);
        assert!((curve.sample(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ramp_interpolates_linearly() {
        let program = Program::ramp(0.0, 1.0, secs(10), Curve::Linear);
        assert!((program.value_at(secs(0)) - 0.0).abs() < 1e-6);
        assert!((program.value_at(secs(5)) - 0.5).abs() < 1e-6);
        assert!((program.value_at(secs(10)) - 1.0).abs() < 1e-6);
        assert!((program.value_at(secs(20)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn delay_holds_start_value() {
        let mut program = Program::ramp(0.2, 0.8, secs(4), Curve::Linear);
        program.delay = secs(3);
        assert!((program.value_at(secs(2)) - 0.2).abs() < 1e-6);
        assert!((program.value_at(secs(5)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn auto_reverse_mirrors_forward_pass() {
        let program = Program::oscillate(0.0, 1.0, secs(10), Curve::Linear);
        assert!((program.value_at(secs(5)) - 0.5).abs() < 1e-6);
        assert!((program.value_at(secs(10)) - 1.0).abs() < 1e-6);
        assert!((program.value_at(secs(15)) - 0.5).abs() < 1e-6);
        // Next cycle replays the same shape.
        assert!((program.value_at(secs(25)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cycle_delay_holds_at_each_cycle_head() {
        let mut program = Program::oscillate(0.3, 0.9, secs(4), Curve::Linear);
        program.cycle_delay = secs(2);
        // cycle = 2s delay + 4s forward + 4s backward = 10s
        assert!((program.value_at(secs(1)) - 0.3).abs() < 1e-6);
        assert!((program.value_at(secs(4)) - 0.6).abs() < 1e-6);
        assert!((program.value_at(secs(11)) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn zero_duration_segment_snaps_after_start() {
        let program = Program {
            start_value: 0.0,
            delay: Duration::ZERO,
            cycle_delay: Duration::ZERO,
            segments: vec![
                Segment::new(0.7, Duration::ZERO, Curve::Linear),
                Segment::new(0.2, secs(10), Curve::Linear),
            ],
            repeat: Repeat::Once,
            auto_reverse: false,
        };
        assert!((program.value_at(Duration::ZERO) - 0.0).abs() < 1e-6);
        let just_after = program.value_at(millis(1));
        assert!((just_after - 0.7).abs() < 1e-3);
    }

    #[test]
    fn finite_repeat_completes_exactly_once() {
        let start = Instant::now();
        let mut timelines: Timelines<&'static str> = Timelines::new();
        let mut program = Program::oscillate(0.0, 1.0, secs(2), Curve::Linear);
        program.repeat = Repeat::Count(3);
        let id = timelines.start(program, "fade", start);

        assert!(timelines.advance(start + secs(11)).is_empty());
        let done = timelines.advance(start + secs(12));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, id);
        assert_eq!(done[0].tag, "fade");
        assert_eq!(done[0].at, start + secs(12));
        // Already-reported completions never fire again.
        assert!(timelines.advance(start + secs(60)).is_empty());
        // The finished timeline stays registered at its final value.
        let value = timelines.value(id, start + secs(60)).expect("registered");
        assert!((value - 0.0).abs() < 1e-6);
    }

    #[test]
    fn forever_program_never_completes() {
        let start = Instant::now();
        let mut timelines: Timelines<()> = Timelines::new();
        timelines.start(
            Program::oscillate(0.0, 1.0, secs(1), Curve::EaseInOut),
            (),
            start,
        );
        assert!(timelines.advance(start + secs(100_000)).is_empty());
    }

    #[test]
    fn completions_sorted_by_finish_instant() {
        let start = Instant::now();
        let mut timelines: Timelines<u32> = Timelines::new();
        let slow = timelines.start(Program::ramp(0.0, 1.0, secs(9), Curve::Linear), 1, start);
        let fast = timelines.start(Program::ramp(0.0, 1.0, secs(3), Curve::Linear), 2, start);
        let done = timelines.advance(start + secs(10));
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].id, fast);
        assert_eq!(done[1].id, slow);
    }

    #[test]
    fn stop_is_idempotent_and_releases_handles() {
        let start = Instant::now();
        let mut timelines: Timelines<()> = Timelines::new();
        let id = timelines.start(Program::ramp(0.0, 1.0, secs(1), Curve::Linear), (), start);
        assert!(timelines.stop(id));
        assert!(!timelines.stop(id));
        assert!(timelines.is_empty());
        assert_eq!(timelines.value(id, start), None);
    }

    #[test]
    fn stop_matching_removes_by_tag() {
        let start = Instant::now();
        let mut timelines: Timelines<u32> = Timelines::new();
        for tag in 0..4u32 {
            timelines.start(Program::ramp(0.0, 1.0, secs(1), Curve::Linear), tag, start);
        }
        let removed = timelines.stop_matching(|tag| tag % 2 == 0);
        assert_eq!(removed, 2);
        assert_eq!(timelines.len(), 2);
    }

    #[test]
    fn finish_at_reports_total_runtime() {
        let start = Instant::now();
        let mut timelines: Timelines<()> = Timelines::new();
        let mut program = Program::oscillate(0.0, 1.0, secs(3), Curve::Linear);
        program.delay = secs(5);
        program.repeat = Repeat::Count(2);
        let id = timelines.start(program, (), start);
        assert_eq!(timelines.finish_at(id), Some(start + secs(17)));

        let endless = timelines.start(
            Program::oscillate(0.0, 1.0, secs(3), Curve::Linear),
            (),
            start,
        );
        assert_eq!(timelines.finish_at(endless), None);
    }
}
