//! Tunables for the ambient mode, loadable from TOML.
//!
//! Every field has a compiled-in default; a configuration file only needs to
//! name the values it overrides. Durations accept either a bare number of
//! seconds or a humantime string (`"25s"`, `"1m 30s"`).

use std::fmt;
use std::time::Duration;

use scene::Rgba;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AmbienceConfig {
    /// Number of concurrently live gradient layers.
    pub concurrent_layers: usize,
    /// Opacity a non-first layer fades in to before its steady fluctuation.
    pub base_opacity: f32,
    /// Fraction of layers spawned fully transparent for visual variety.
    pub empty_layer_probability: f32,
    /// Minimum angular separation between consecutive layers' gradients.
    pub angle_berth_degrees: f32,
    /// Fade-in duration for the initial batch of layers.
    #[serde(deserialize_with = "deserialize_duration")]
    pub fade_in_first_batch: Duration,
    /// Fade-in duration for every layer after the initial batch.
    #[serde(deserialize_with = "deserialize_duration")]
    pub fade_in_steady_state: Duration,
    /// Fixed duration of the final ramp to full opacity.
    #[serde(deserialize_with = "deserialize_duration")]
    pub converge_duration: Duration,
    /// Minimum steady time a fresh lifespan carries beyond its fade-in.
    #[serde(deserialize_with = "deserialize_duration")]
    pub min_tail: Duration,
    /// Upper bound of the uniform sample squared into the lifespan tail.
    pub lifespan_quadratic_base: f32,
    pub particle_base_count: usize,
    /// Surface area (pixels) contributing one extra particle.
    pub particle_density_divisor: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub particle_base_duration: Duration,
    /// Upper bound of the random extra fade time added per particle.
    #[serde(deserialize_with = "deserialize_duration")]
    pub particle_extra_duration: Duration,
    /// Upper bound of the random delay at the head of each fade cycle.
    #[serde(deserialize_with = "deserialize_duration")]
    pub particle_cycle_delay_max: Duration,
    /// Upper bound of the one-time stagger before a particle's first cycle.
    #[serde(deserialize_with = "deserialize_duration")]
    pub particle_initial_stagger_max: Duration,
    /// Base colors of the four gradient stops, as `[r, g, b, a]` rows.
    pub palette: [[f32; 4]; 4],
    /// Amplitude of the per-layer shared palette tweak.
    pub color_tweak_range: f32,
    /// Amplitude of the per-stop color-channel oscillation.
    pub color_delta_range: f32,
}

impl Default for AmbienceConfig {
    fn default() -> Self {
        Self {
            concurrent_layers: 4,
            base_opacity: 0.7,
            empty_layer_probability: 0.0,
            angle_berth_degrees: 20.0,
            fade_in_first_batch: Duration::ZERO,
            fade_in_steady_state: Duration::from_secs(5),
            converge_duration: Duration::from_secs(7),
            min_tail: Duration::from_secs(5),
            lifespan_quadratic_base: 5.0,
            particle_base_count: 10,
            particle_density_divisor: 2500,
            particle_base_duration: Duration::from_secs(8),
            particle_extra_duration: Duration::from_secs(4),
            particle_cycle_delay_max: Duration::from_secs(5),
            particle_initial_stagger_max: Duration::from_secs(25),
            palette: [
                [0.05, 0.08, 0.18, 0.85],
                [0.10, 0.05, 0.22, 0.75],
                [0.02, 0.12, 0.25, 0.80],
                [0.15, 0.08, 0.30, 0.70],
            ],
            color_tweak_range: 0.12,
            color_delta_range: 0.08,
        }
    }
}

impl AmbienceConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrent_layers == 0 {
            return Err(ConfigError::Invalid(
                "concurrent_layers must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.base_opacity) {
            return Err(ConfigError::Invalid(format!(
                "base_opacity {} outside [0, 1]",
                self.base_opacity
            )));
        }
        if !(0.0..=1.0).contains(&self.empty_layer_probability) {
            return Err(ConfigError::Invalid(format!(
                "empty_layer_probability {} outside [0, 1]",
                self.empty_layer_probability
            )));
        }
        if !(0.0..360.0).contains(&self.angle_berth_degrees) {
            return Err(ConfigError::Invalid(format!(
                "angle_berth_degrees {} outside [0, 360)",
                self.angle_berth_degrees
            )));
        }
        if self.particle_density_divisor == 0 {
            return Err(ConfigError::Invalid(
                "particle_density_divisor must be nonzero".into(),
            ));
        }
        if self.lifespan_quadratic_base < 0.0 || !self.lifespan_quadratic_base.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "lifespan_quadratic_base {} must be finite and non-negative",
                self.lifespan_quadratic_base
            )));
        }
        if self.color_tweak_range < 0.0 || self.color_delta_range < 0.0 {
            return Err(ConfigError::Invalid(
                "color ranges must be non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn palette_colors(&self) -> [Rgba; 4] {
        self.palette
            .map(|[r, g, b, a]| Rgba::new(r, g, b, a))
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must not be negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v < 0.0 {
                return Err(E::custom("duration must be a non-negative number"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }
    deserializer.deserialize_any(Visitor)
}
