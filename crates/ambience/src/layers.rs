//! Layer lifecycle scheduling: the core state machine.
//!
//! Layers live in a FIFO queue ordered by their monotonically increasing
//! index. A layer moves `Entering → Steady → Converging → Full → Retired`;
//! it never retires itself. When a layer's opacity program completes (its
//! converge phase reached full opacity), the layer at the front of the
//! queue, which must be its immediate predecessor, is retired and a
//! successor is spawned, continuing the chain indefinitely. The chain is
//! driven by completion events from the timeline registry rather than
//! call-stack recursion, so it neither grows the stack nor races its own
//! teardown.
//!
//! Lifespan chaining is what makes the hand-off seamless: a fresh layer's
//! lifespan is extended by whatever remains of its predecessor's, so the new
//! layer cannot reach full opacity until strictly after the predecessor
//! would have. The converge phase has a fixed duration on top of the
//! lifespan, which keeps the successor's retirement logic from firing before
//! this layer visually reaches full opacity.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::prelude::*;
use rand::rngs::StdRng;
use scene::{Element, ElementId, GradientRect, Surface};
use timeline::{Curve, Program, Repeat, Segment, TimelineId, Timelines};
use tracing::debug;

use crate::config::AmbienceConfig;
use crate::stops::{build_stops, StopAnimation};
use crate::AnimTag;

const STEADY_OPACITY_RANGE: (f32, f32) = (0.02, 0.3);
const STEADY_HOLD_SECS: (f64, f64) = (4.0, 15.0);

/// Lifecycle phase of one layer, derived from its phase boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Entering,
    Steady,
    Converging,
    Full,
    Retired,
}

/// One full-viewport translucent gradient participating in the cross-fade
/// chain. Owns the handles to everything animating it.
#[derive(Debug)]
pub struct AmbientLayer {
    pub index: u64,
    pub birth: Instant,
    pub lifespan: Duration,
    pub fade_in: Duration,
    pub angle_degrees: f32,
    pub base_opacity: f32,
    /// Opacity the steady phase ends on; the converge phase ramps from here.
    pub final_fluctuation_opacity: f32,
    pub element: ElementId,
    pub stops: [StopAnimation; 4],
    pub opacity_timeline: TimelineId,
    /// Set when the layer was torn down early by deactivation; its pending
    /// completion callback must then do nothing.
    pub end_of_line: bool,
    pub retired: bool,
    pub full: bool,
}

impl AmbientLayer {
    pub fn state(&self, now: Instant) -> LayerState {
        if self.retired {
            return LayerState::Retired;
        }
        if self.full {
            return LayerState::Full;
        }
        let age = now.saturating_duration_since(self.birth);
        if age < self.fade_in {
            LayerState::Entering
        } else if age < self.lifespan {
            LayerState::Steady
        } else {
            LayerState::Converging
        }
    }
}

/// FIFO queue of live layers plus the per-activation index counter.
#[derive(Default)]
pub struct LayerChain {
    queue: VecDeque<AmbientLayer>,
    next_index: u64,
    spawned: u64,
    retired: u64,
}

impl LayerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AmbientLayer> {
        self.queue.iter()
    }

    pub fn front(&self) -> Option<&AmbientLayer> {
        self.queue.front()
    }

    pub fn back(&self) -> Option<&AmbientLayer> {
        self.queue.back()
    }

    pub fn min_index(&self) -> Option<u64> {
        self.queue.iter().map(|layer| layer.index).min()
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn retired(&self) -> u64 {
        self.retired
    }

    /// Resets the index counter for a fresh activation. The queue must have
    /// been torn down first.
    pub fn reset(&mut self) {
        assert!(self.queue.is_empty(), "resetting a chain with live layers");
        self.next_index = 0;
        self.spawned = 0;
        self.retired = 0;
    }

    /// Creates the next layer in the chain and starts its animations.
    pub fn spawn(
        &mut self,
        config: &AmbienceConfig,
        surface: &mut Surface,
        timelines: &mut Timelines<AnimTag>,
        rng: &mut StdRng,
        now: Instant,
    ) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        let first = index == 0;
        let first_batch = index < config.concurrent_layers as u64;
        let fade_in = if first_batch {
            config.fade_in_first_batch
        } else {
            config.fade_in_steady_state
        };

        // A fresh lifespan, extended by the predecessor's remaining one so
        // this layer cannot complete before the predecessor would have.
        let quad = rng.gen::<f64>() * config.lifespan_quadratic_base as f64;
        let own = fade_in + config.min_tail + Duration::from_secs_f64(quad * quad);
        let lifespan = match self.queue.back() {
            Some(prev) => {
                let age = now.saturating_duration_since(prev.birth);
                if age < prev.lifespan {
                    own + (prev.lifespan - age)
                } else {
                    own
                }
            }
            None => own,
        };

        let angle_degrees = match self.queue.back() {
            None => rng.gen_range(0.0..360.0),
            Some(prev) => {
                let offset = rng.gen_range(config.angle_berth_degrees..360.0);
                (prev.angle_degrees + offset).rem_euclid(360.0)
            }
        };

        let base_opacity = if rng.gen::<f32>() < config.empty_layer_probability {
            0.0
        } else {
            config.base_opacity
        };

        let stops = build_stops(config, index, timelines, rng, now);
        let (program, final_fluctuation_opacity) = if first {
            // The seed layer has no predecessor to cross-fade from: it is
            // born fully opaque and merely holds until its converge phase
            // runs out, keeping its completion instant well-defined.
            let program = Program {
                start_value: 1.0,
                delay: Duration::ZERO,
                cycle_delay: Duration::ZERO,
                segments: vec![
                    Segment::new(1.0, lifespan, Curve::Linear),
                    Segment::new(1.0, config.converge_duration, Curve::Linear),
                ],
                repeat: Repeat::Once,
                auto_reverse: false,
            };
            (program, 1.0)
        } else {
            let mut segments = vec![Segment::new(base_opacity, fade_in, Curve::Linear)];
            let steady = lifespan - fade_in;
            let last_value = if base_opacity == 0.0 {
                // Empty layers stay transparent through their steady phase
                // but still converge on schedule so the chain's timing is
                // unchanged.
                segments.push(Segment::new(0.0, steady, Curve::Linear));
                0.0
            } else {
                let mut remaining = steady;
                let mut last_value = base_opacity;
                loop {
                    let hold = Duration::from_secs_f64(
                        rng.gen_range(STEADY_HOLD_SECS.0..STEADY_HOLD_SECS.1),
                    );
                    let value =
                        rng.gen_range(STEADY_OPACITY_RANGE.0..=STEADY_OPACITY_RANGE.1);
                    last_value = value;
                    if hold >= remaining {
                        // Clip the final fluctuation to exhaust the steady
                        // phase exactly; segments never overshoot the
                        // lifespan.
                        segments.push(Segment::new(value, remaining, Curve::Spline));
                        break;
                    }
                    segments.push(Segment::new(value, hold, Curve::Spline));
                    remaining -= hold;
                }
                last_value
            };
            segments.push(Segment::new(
                1.0,
                config.converge_duration,
                Curve::Linear,
            ));
            let program = Program {
                start_value: 0.0,
                delay: Duration::ZERO,
                cycle_delay: Duration::ZERO,
                segments,
                repeat: Repeat::Once,
                auto_reverse: false,
            };
            (program, last_value)
        };

        let initial_stops =
            std::array::from_fn(|i| stops[i].rendered(timelines, now));
        let element = surface.attach(Element::Gradient(GradientRect {
            angle_degrees,
            opacity: if first { 1.0 } else { 0.0 },
            stops: initial_stops,
        }));
        let opacity_timeline =
            timelines.start(program, AnimTag::LayerOpacity { layer: index }, now);

        debug!(
            layer = index,
            angle = angle_degrees,
            lifespan_secs = lifespan.as_secs_f64(),
            "ambient layer spawned"
        );
        self.queue.push_back(AmbientLayer {
            index,
            birth: now,
            lifespan,
            fade_in,
            angle_degrees,
            base_opacity,
            final_fluctuation_opacity,
            element,
            stops,
            opacity_timeline,
            end_of_line: false,
            retired: false,
            full: first,
        });
        self.spawned += 1;
        index
    }

    /// Retirement protocol, run when a layer's opacity program completes.
    ///
    /// The completed layer becomes the new top. Unless it is the seed layer,
    /// the queue front (which must be its immediate predecessor) is freed
    /// and a successor is spawned. Queue-order mismatches are programming
    /// errors and abort loudly rather than corrupt the chain.
    pub fn on_opacity_complete(
        &mut self,
        config: &AmbienceConfig,
        surface: &mut Surface,
        timelines: &mut Timelines<AnimTag>,
        rng: &mut StdRng,
        now: Instant,
        index: u64,
    ) {
        let Some(position) = self.queue.iter().position(|layer| layer.index == index) else {
            return;
        };
        if self.queue[position].end_of_line {
            return;
        }
        self.queue[position].full = true;
        if index == 0 {
            // The seed layer has no predecessor to retire and spawns no
            // successor; the chain is carried by the layers after it.
            return;
        }

        let mut front = self
            .queue
            .pop_front()
            .expect("queue cannot be empty while one of its layers completes");
        assert_eq!(
            front.index,
            index - 1,
            "layer queue out of order: expected layer {} at the front, found {}",
            index - 1,
            front.index
        );
        Self::free_layer(&mut front, surface, timelines);
        self.retired += 1;
        assert!(
            self.queue.iter().all(|layer| layer.index >= index),
            "layer queue holds an index older than the completing layer {index}"
        );
        self.spawn(config, surface, timelines, rng, now);
    }

    /// Frees every live layer. Pending completions become no-ops via
    /// `end_of_line`; the single-free guard makes a second pass harmless.
    pub fn teardown(&mut self, surface: &mut Surface, timelines: &mut Timelines<AnimTag>) {
        for mut layer in self.queue.drain(..) {
            layer.end_of_line = true;
            Self::free_layer(&mut layer, surface, timelines);
        }
    }

    fn free_layer(
        layer: &mut AmbientLayer,
        surface: &mut Surface,
        timelines: &mut Timelines<AnimTag>,
    ) {
        if layer.retired {
            return;
        }
        layer.retired = true;
        timelines.stop(layer.opacity_timeline);
        for stop in &layer.stops {
            stop.release(timelines);
        }
        surface.detach(layer.element);
        debug!(layer = layer.index, "ambient layer retired");
    }
}
