//! Gradient stop construction for one ambient layer.
//!
//! Each layer carries exactly four color stops. Stop 0 is pinned to position
//! 0.0; stops 1–3 oscillate forever between layer-independent position
//! bounds. All four stops additionally oscillate their color by a small
//! signed per-channel delta. A single random tweak shared by the four stops
//! keeps one layer's palette internally consistent while varying it layer to
//! layer.

use std::time::{Duration, Instant};

use rand::prelude::*;
use rand::rngs::StdRng;
use scene::{GradientStop, Rgba};
use timeline::{Curve, Program, TimelineId, Timelines};

use crate::config::AmbienceConfig;
use crate::AnimTag;

/// Conceptual stop positions; stops 1-3 oscillate around theirs.
pub const STOP_POSITIONS: [f32; 4] = [0.0, 0.3, 0.6, 1.0];

/// Oscillation bounds (start, far end) for stops 1-3.
const POSITION_BOUNDS: [(f32, f32); 3] = [(0.03, 0.30), (0.73, 0.37), (0.97, 0.80)];

const POSITION_PERIOD_SECS: (f64, f64) = (15.0, 30.0);
const COLOR_PERIOD_SECS: (f64, f64) = (10.0, 30.0);

/// One stop's state plus the handles to its running oscillations. Owned by
/// the parent layer and released together with it.
#[derive(Debug)]
pub struct StopAnimation {
    pub index: usize,
    pub position_base: f32,
    pub initial_position: f32,
    pub color_base: Rgba,
    pub color_delta: [f32; 4],
    /// `None` for stop 0, which never moves.
    pub position_timeline: Option<TimelineId>,
    pub color_timeline: TimelineId,
}

impl StopAnimation {
    /// Current stop as the host would draw it.
    pub fn rendered(&self, timelines: &Timelines<AnimTag>, now: Instant) -> GradientStop {
        let position = self
            .position_timeline
            .and_then(|id| timelines.value(id, now))
            .unwrap_or(self.initial_position);
        let mix = timelines.value(self.color_timeline, now).unwrap_or(0.0);
        GradientStop {
            position,
            color: self.color_base.with_delta(self.color_delta, mix),
        }
    }

    /// Stops both oscillations. Safe to call on an already-released stop.
    pub fn release(&self, timelines: &mut Timelines<AnimTag>) {
        if let Some(id) = self.position_timeline {
            timelines.stop(id);
        }
        timelines.stop(self.color_timeline);
    }
}

/// Builds the four stops for `layer_index` and starts their oscillations.
pub fn build_stops(
    config: &AmbienceConfig,
    layer_index: u64,
    timelines: &mut Timelines<AnimTag>,
    rng: &mut StdRng,
    now: Instant,
) -> [StopAnimation; 4] {
    let palette = config.palette_colors();
    let tweak = symmetric(rng, config.color_tweak_range);
    std::array::from_fn(|index| {
        let color_base = palette[index].tweaked(tweak);
        let color_delta = [
            symmetric(rng, config.color_delta_range),
            symmetric(rng, config.color_delta_range),
            symmetric(rng, config.color_delta_range),
            0.0,
        ];
        let (initial_position, position_timeline) = if index == 0 {
            (STOP_POSITIONS[0], None)
        } else {
            let (from, to) = POSITION_BOUNDS[index - 1];
            let period = random_period(rng, POSITION_PERIOD_SECS);
            let id = timelines.start(
                Program::oscillate(from, to, period, Curve::EaseInOut),
                AnimTag::StopPosition {
                    layer: layer_index,
                    stop: index,
                },
                now,
            );
            (from, Some(id))
        };
        let color_timeline = timelines.start(
            Program::oscillate(0.0, 1.0, random_period(rng, COLOR_PERIOD_SECS), Curve::EaseInOut),
            AnimTag::StopColor {
                layer: layer_index,
                stop: index,
            },
            now,
        );
        StopAnimation {
            index,
            position_base: STOP_POSITIONS[index],
            initial_position,
            color_base,
            color_delta,
            position_timeline,
            color_timeline,
        }
    })
}

fn symmetric(rng: &mut StdRng, range: f32) -> f32 {
    if range <= 0.0 {
        return 0.0;
    }
    rng.gen_range(-range..=range)
}

fn random_period(rng: &mut StdRng, (lo, hi): (f64, f64)) -> Duration {
    Duration::from_secs_f64(rng.gen_range(lo..hi))
}
