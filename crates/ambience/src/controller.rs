//! Top-level activate/deactivate/resize orchestration.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use scene::{Element, ElementId, Surface};
use serde::Serialize;
use timeline::Timelines;
use tracing::debug;

use crate::config::{AmbienceConfig, ConfigError};
use crate::field::StarField;
use crate::layers::{AmbientLayer, LayerChain};
use crate::AnimTag;

/// Counters and gauges summarising an ambient run.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub layers_spawned: u64,
    pub layers_retired: u64,
    pub particles_spawned: u64,
    pub particles_replaced: u64,
    pub field_sessions: u64,
    pub live_layers: usize,
    pub live_particles: usize,
    pub active_timelines: usize,
}

/// The ambient mode controller.
///
/// Owns the render surface, the timeline registry, and the two subsystems
/// (layer chain, star field), and wires completion events between them. All
/// operations run on the caller's single thread; the only reentrancy point
/// is completion dispatch inside [`tick`](AmbientMode::tick).
pub struct AmbientMode {
    config: AmbienceConfig,
    surface: Surface,
    timelines: Timelines<AnimTag>,
    field: StarField,
    chain: LayerChain,
    rng: StdRng,
    overlay: Option<ElementId>,
    active: bool,
}

impl AmbientMode {
    pub fn new(
        config: AmbienceConfig,
        width: u32,
        height: u32,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            surface: Surface::new(width, height),
            timelines: Timelines::new(),
            field: StarField::new(),
            chain: LayerChain::new(),
            rng: StdRng::seed_from_u64(seed),
            overlay: None,
            active: false,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &AmbienceConfig {
        &self.config
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn timelines(&self) -> &Timelines<AnimTag> {
        &self.timelines
    }

    pub fn field(&self) -> &StarField {
        &self.field
    }

    pub fn layers(&self) -> impl Iterator<Item = &AmbientLayer> {
        self.chain.iter()
    }

    pub fn live_layers(&self) -> usize {
        self.chain.len()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            layers_spawned: self.chain.spawned(),
            layers_retired: self.chain.retired(),
            particles_spawned: self.field.spawned(),
            particles_replaced: self.field.replaced(),
            field_sessions: self.field.session(),
            live_layers: self.chain.len(),
            live_particles: self.field.particle_count(),
            active_timelines: self.timelines.len(),
        }
    }

    /// Starts (or cleanly restarts) the ambient mode: hides the normal
    /// content, spawns the initial layer batch, and generates the particle
    /// field.
    pub fn activate(&mut self, include_info_overlay: bool, now: Instant) {
        self.deactivate(false);
        debug!(
            layers = self.config.concurrent_layers,
            "activating ambient mode"
        );
        self.surface.set_content_visible(false);
        self.chain.reset();
        for _ in 0..self.config.concurrent_layers {
            self.chain.spawn(
                &self.config,
                &mut self.surface,
                &mut self.timelines,
                &mut self.rng,
                now,
            );
        }
        self.field.generate(
            &self.config,
            &mut self.surface,
            &mut self.timelines,
            &mut self.rng,
            now,
        );
        if include_info_overlay {
            self.overlay = Some(self.surface.attach(Element::Overlay));
        }
        self.active = true;
        self.sync_scene(now);
    }

    /// Tears everything down: layers, particles, timelines, overlay (unless
    /// kept), and restores the normal content. A second call is a no-op.
    pub fn deactivate(&mut self, keep_overlay: bool) {
        if !self.active {
            return;
        }
        debug!("deactivating ambient mode");
        if !keep_overlay {
            if let Some(id) = self.overlay.take() {
                self.surface.detach(id);
            }
        }
        self.chain.teardown(&mut self.surface, &mut self.timelines);
        let swept = self.timelines.stop_matching(|tag| tag.is_layer());
        if swept > 0 {
            debug!(swept, "released orphaned layer timelines");
        }
        self.field.deactivate(&mut self.surface, &mut self.timelines);
        self.surface.set_content_visible(true);
        self.active = false;
    }

    /// Layers fill the viewport by construction; only the particle field is
    /// rebuilt for the new bounds.
    pub fn resize(&mut self, width: u32, height: u32, now: Instant) {
        self.surface.resize(width, height);
        if !self.active {
            return;
        }
        self.field.generate(
            &self.config,
            &mut self.surface,
            &mut self.timelines,
            &mut self.rng,
            now,
        );
        self.sync_scene(now);
    }

    /// Advances the clock: dispatches timeline completions to their owners
    /// and writes current animation values back into the scene.
    pub fn tick(&mut self, now: Instant) {
        for completion in self.timelines.advance(now) {
            match completion.tag {
                AnimTag::LayerOpacity { layer } => {
                    self.chain.on_opacity_complete(
                        &self.config,
                        &mut self.surface,
                        &mut self.timelines,
                        &mut self.rng,
                        now,
                        layer,
                    );
                }
                AnimTag::ParticleFade {
                    session,
                    element,
                    repeats,
                } => {
                    self.field.on_fade_complete(
                        &self.config,
                        &mut self.surface,
                        &mut self.timelines,
                        &mut self.rng,
                        now,
                        completion.id,
                        element,
                        session,
                        repeats,
                    );
                }
                // Stop oscillations repeat forever and never complete.
                AnimTag::StopPosition { .. } | AnimTag::StopColor { .. } => {}
            }
        }
        self.sync_scene(now);
    }

    fn sync_scene(&mut self, now: Instant) {
        for layer in self.chain.iter() {
            if let Some(opacity) = self.timelines.value(layer.opacity_timeline, now) {
                if let Some(rect) = self.surface.gradient_mut(layer.element) {
                    rect.opacity = opacity;
                    for (slot, stop) in rect.stops.iter_mut().zip(&layer.stops) {
                        *slot = stop.rendered(&self.timelines, now);
                    }
                }
            }
        }
        self.field.sync(&mut self.surface, &self.timelines, now);
    }
}
