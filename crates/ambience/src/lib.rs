//! Ambient "idle" visual mode engine.
//!
//! A procedurally generated, infinitely running background made of two
//! independent parts: a rotating queue of cross-fading translucent gradient
//! layers and a regenerating field of twinkling point particles. The overall
//! flow is:
//!
//! ```text
//!   host application
//!         │ activate / deactivate / resize / tick
//!         ▼
//!   AmbientMode ──▶ LayerChain ──▶ gradient rects + stop oscillations
//!         │                │
//!         │                └─▶ retirement protocol on converge completion
//!         └──▶ StarField ──▶ point sprites + fade cycles (session-guarded)
//! ```
//!
//! Everything is driven by one clock-explicit [`timeline::Timelines`]
//! registry advanced from [`AmbientMode::tick`]; completion dispatch inside
//! `tick` is the only reentrancy point, which gives a total order on layer
//! creation and retirement without locks. The engine runs forever without
//! visible discontinuity: live state is bounded (a fixed number of layers, a
//! fixed particle population), while the chain of layer indices grows
//! monotonically.

pub mod config;
pub mod field;
pub mod layers;
pub mod stops;

mod controller;

pub use config::{AmbienceConfig, ConfigError};
pub use controller::{AmbientMode, Stats};
pub use field::StarField;
pub use layers::{AmbientLayer, LayerChain, LayerState};
pub use stops::StopAnimation;

use scene::ElementId;

/// Tag carried by every timeline the engine starts.
///
/// Tags are unique per owner (`(layer, stop)` for gradient stops, the
/// element handle for particles), so teardown can locate and release
/// everything without string-keyed registries. Particle tags additionally
/// capture the field session they belong to; a completion whose session no
/// longer matches the live one is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimTag {
    LayerOpacity {
        layer: u64,
    },
    StopPosition {
        layer: u64,
        stop: usize,
    },
    StopColor {
        layer: u64,
        stop: usize,
    },
    ParticleFade {
        session: u64,
        element: ElementId,
        repeats: u32,
    },
}

impl AnimTag {
    /// True for timelines owned by the layer system (opacity programs and
    /// stop oscillations).
    pub fn is_layer(&self) -> bool {
        matches!(
            self,
            AnimTag::LayerOpacity { .. }
                | AnimTag::StopPosition { .. }
                | AnimTag::StopColor { .. }
        )
    }
}
