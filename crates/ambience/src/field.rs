//! Regenerating field of twinkling point particles.
//!
//! The field keeps a density-scaled population twinkling indefinitely. Every
//! regeneration bumps a session token; fade completions carrying an older
//! session (or arriving after the field was deactivated) are ignored, so a
//! cleared field can never be resurrected by a stale timer.

use std::time::{Duration, Instant};

use rand::prelude::*;
use rand::rngs::StdRng;
use scene::{Element, ElementId, PointSprite, Surface};
use timeline::{Curve, Program, Repeat, Segment, TimelineId, Timelines};
use tracing::debug;

use crate::config::AmbienceConfig;
use crate::AnimTag;

struct ParticleRecord {
    element: ElementId,
    timeline: TimelineId,
    repeats: u32,
    session: u64,
}

#[derive(Default)]
pub struct StarField {
    session: u64,
    active: bool,
    particles: Vec<ParticleRecord>,
    spawned: u64,
    replaced: u64,
}

impl StarField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn replaced(&self) -> u64 {
        self.replaced
    }

    /// Population for a surface of the given size.
    pub fn population(config: &AmbienceConfig, width: u32, height: u32) -> usize {
        let area = width as u64 * height as u64;
        config.particle_base_count + (area / config.particle_density_divisor as u64) as usize
    }

    /// Clears any prior generation, bumps the session, and fills the surface
    /// with a fresh twinkling population.
    pub fn generate(
        &mut self,
        config: &AmbienceConfig,
        surface: &mut Surface,
        timelines: &mut Timelines<AnimTag>,
        rng: &mut StdRng,
        now: Instant,
    ) {
        self.clear(surface, timelines);
        self.session += 1;
        self.active = true;
        let count = Self::population(config, surface.width(), surface.height());
        debug!(session = self.session, count, "generating star field");
        for _ in 0..count {
            let repeats = draw_repeat_count(rng);
            self.spawn_particle(config, surface, timelines, rng, now, repeats);
        }
    }

    /// Stops and detaches every particle's fade timeline before removing the
    /// particle itself, leaving no animation handles behind.
    pub fn clear(&mut self, surface: &mut Surface, timelines: &mut Timelines<AnimTag>) {
        for record in self.particles.drain(..) {
            timelines.stop(record.timeline);
            surface.detach(record.element);
        }
    }

    /// Clears the field and stops accepting fade completions.
    pub fn deactivate(&mut self, surface: &mut Surface, timelines: &mut Timelines<AnimTag>) {
        self.clear(surface, timelines);
        self.active = false;
    }

    /// Handles a particle fade-timeline completion.
    ///
    /// The completed timeline is always released. If the captured session
    /// still matches the live one and the field is active, the particle is
    /// replaced by a fresh one with the same repeat count at a new random
    /// position, keeping the population size constant. Otherwise the
    /// completion is stale and ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn on_fade_complete(
        &mut self,
        config: &AmbienceConfig,
        surface: &mut Surface,
        timelines: &mut Timelines<AnimTag>,
        rng: &mut StdRng,
        now: Instant,
        timeline: TimelineId,
        element: ElementId,
        session: u64,
        repeats: u32,
    ) {
        timelines.stop(timeline);
        if session != self.session || !self.active {
            return;
        }
        let Some(index) = self.particles.iter().position(|p| p.element == element) else {
            return;
        };
        let record = self.particles.swap_remove(index);
        surface.detach(record.element);
        self.replaced += 1;
        self.spawn_particle(config, surface, timelines, rng, now, repeats);
    }

    /// Copies each particle's current fade value onto its point sprite.
    pub fn sync(&self, surface: &mut Surface, timelines: &Timelines<AnimTag>, now: Instant) {
        for record in &self.particles {
            if let Some(opacity) = timelines.value(record.timeline, now) {
                if let Some(point) = surface.point_mut(record.element) {
                    point.opacity = opacity;
                }
            }
        }
    }

    fn spawn_particle(
        &mut self,
        config: &AmbienceConfig,
        surface: &mut Surface,
        timelines: &mut Timelines<AnimTag>,
        rng: &mut StdRng,
        now: Instant,
        repeats: u32,
    ) {
        let x = rng.gen::<f32>() * surface.width() as f32;
        let y = rng.gen::<f32>() * surface.height() as f32;
        let half = (config.particle_base_duration + random_duration(rng, config.particle_extra_duration)) / 2;
        let program = Program {
            start_value: 0.0,
            delay: random_duration(rng, config.particle_initial_stagger_max),
            cycle_delay: random_duration(rng, config.particle_cycle_delay_max),
            segments: vec![Segment::new(1.0, half, Curve::EaseInOut)],
            repeat: Repeat::Count(repeats),
            auto_reverse: true,
        };
        let element = surface.attach(Element::Point(PointSprite {
            x,
            y,
            opacity: 0.0,
        }));
        let timeline = timelines.start(
            program,
            AnimTag::ParticleFade {
                session: self.session,
                element,
                repeats,
            },
            now,
        );
        self.particles.push(ParticleRecord {
            element,
            timeline,
            repeats,
            session: self.session,
        });
        self.spawned += 1;
    }
}

/// Repeat counts come from a skewed distribution: square a uniform draw so
/// most particles live a few cycles while a long tail lives for many.
fn draw_repeat_count(rng: &mut StdRng) -> u32 {
    let base: f32 = rng.gen_range(1.0..100.0);
    let jitter: f32 = rng.gen_range(0.0..5.0);
    (base * base + jitter) as u32
}

fn random_duration(rng: &mut StdRng, max: Duration) -> Duration {
    max.mul_f64(rng.gen::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse_config() -> AmbienceConfig {
        AmbienceConfig {
            particle_base_count: 1,
            particle_density_divisor: u32::MAX,
            ..AmbienceConfig::default()
        }
    }

    #[test]
    fn population_scales_with_area() {
        let config = AmbienceConfig::default();
        assert_eq!(StarField::population(&config, 1000, 800), 330);
        assert_eq!(StarField::population(&config, 0, 0), 10);
    }

    #[test]
    fn generate_then_clear_leaves_nothing() {
        let config = AmbienceConfig::default();
        let mut surface = Surface::new(1000, 800);
        let mut timelines = Timelines::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut field = StarField::new();
        let now = Instant::now();

        field.generate(&config, &mut surface, &mut timelines, &mut rng, now);
        assert_eq!(field.particle_count(), 330);
        assert_eq!(surface.len(), 330);
        assert_eq!(timelines.len(), 330);

        field.clear(&mut surface, &mut timelines);
        assert_eq!(field.particle_count(), 0);
        assert!(surface.is_empty());
        assert!(timelines.is_empty());
    }

    #[test]
    fn regeneration_bumps_session() {
        let config = sparse_config();
        let mut surface = Surface::new(100, 100);
        let mut timelines = Timelines::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut field = StarField::new();
        let now = Instant::now();

        field.generate(&config, &mut surface, &mut timelines, &mut rng, now);
        let first = field.session();
        field.generate(&config, &mut surface, &mut timelines, &mut rng, now);
        assert_eq!(field.session(), first + 1);
        assert_eq!(field.particle_count(), 1);
        assert_eq!(timelines.len(), 1);
    }

    #[test]
    fn stale_session_completion_is_ignored() {
        let config = sparse_config();
        let mut surface = Surface::new(100, 100);
        let mut timelines = Timelines::new();
        let mut rng = StdRng::seed_from_u64(9);
        let mut field = StarField::new();
        let now = Instant::now();

        field.generate(&config, &mut surface, &mut timelines, &mut rng, now);
        let old_session = field.session();
        let (old_element, old_timeline) = {
            let record = &field.particles[0];
            (record.element, record.timeline)
        };
        // Supersede the first generation, then deliver a completion that was
        // already in flight for it.
        field.generate(&config, &mut surface, &mut timelines, &mut rng, now);
        field.on_fade_complete(
            &config,
            &mut surface,
            &mut timelines,
            &mut rng,
            now,
            old_timeline,
            old_element,
            old_session,
            4,
        );
        // The population stays pinned at the fresh generation's count.
        assert_eq!(field.particle_count(), 1);
        assert_eq!(field.replaced(), 0);
        assert_eq!(surface.len(), 1);
        assert_eq!(timelines.len(), 1);
    }

    #[test]
    fn completion_replaces_particle_in_place() {
        let config = sparse_config();
        let mut surface = Surface::new(100, 100);
        let mut timelines = Timelines::new();
        let mut rng = StdRng::seed_from_u64(11);
        let mut field = StarField::new();
        let now = Instant::now();

        field.generate(&config, &mut surface, &mut timelines, &mut rng, now);
        let (element, timeline, repeats) = {
            let record = &field.particles[0];
            (record.element, record.timeline, record.repeats)
        };
        let finish = timelines.finish_at(timeline).expect("finite fade");

        let completions = timelines.advance(finish + Duration::from_millis(1));
        assert_eq!(completions.len(), 1);
        let completion = &completions[0];
        let AnimTag::ParticleFade {
            session,
            element: tagged_element,
            repeats: tagged_repeats,
        } = completion.tag
        else {
            panic!("expected a particle tag");
        };
        assert_eq!(tagged_element, element);
        assert_eq!(tagged_repeats, repeats);

        field.on_fade_complete(
            &config,
            &mut surface,
            &mut timelines,
            &mut rng,
            finish + Duration::from_millis(1),
            completion.id,
            tagged_element,
            session,
            tagged_repeats,
        );

        assert_eq!(field.particle_count(), 1);
        assert_eq!(field.replaced(), 1);
        assert_eq!(surface.len(), 1);
        assert_eq!(timelines.len(), 1);
        let fresh = &field.particles[0];
        assert_ne!(fresh.element, element);
        assert_eq!(fresh.repeats, repeats);
        assert_eq!(fresh.session, field.session());
    }

    #[test]
    fn deactivated_field_ignores_live_session_completion() {
        let config = sparse_config();
        let mut surface = Surface::new(100, 100);
        let mut timelines = Timelines::new();
        let mut rng = StdRng::seed_from_u64(13);
        let mut field = StarField::new();
        let now = Instant::now();

        field.generate(&config, &mut surface, &mut timelines, &mut rng, now);
        let session = field.session();
        let (element, timeline) = {
            let record = &field.particles[0];
            (record.element, record.timeline)
        };
        field.deactivate(&mut surface, &mut timelines);

        field.on_fade_complete(
            &config,
            &mut surface,
            &mut timelines,
            &mut rng,
            now,
            timeline,
            element,
            session,
            4,
        );
        assert_eq!(field.particle_count(), 0);
        assert!(surface.is_empty());
        assert!(timelines.is_empty());
    }

    #[test]
    fn repeat_counts_skew_low_with_long_tail() {
        let mut rng = StdRng::seed_from_u64(21);
        let draws: Vec<u32> = (0..1000).map(|_| draw_repeat_count(&mut rng)).collect();
        let low = draws.iter().filter(|&&r| r < 2500).count();
        assert!(draws.iter().all(|&r| (1..10005).contains(&r)));
        // Squaring a uniform draw puts roughly half the mass below the
        // quarter point of the range.
        assert!(low > 400 && low < 600, "low draws: {low}");
    }
}
