//! Engine configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::params::Param;

/// What a note-on does when the same `(channel, note)` is still sounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetriggerPolicy {
    /// Restart the envelopes of the sounding voice.
    #[default]
    Restart,
    /// Release the sounding voice and allocate a new one.
    Retrigger,
}

/// MPE zone layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MpeConfig {
    /// Channel carrying zone-wide messages.
    pub master_channel: u8,
    /// First member channel.
    pub member_begin: u8,
    /// Last member channel, inclusive.
    pub member_end: u8,
    /// Per-note pitch bend range in semitones.
    #[serde(default = "default_member_bend_range")]
    pub bend_range: f32,
}

fn default_member_bend_range() -> f32 {
    48.0
}

impl MpeConfig {
    /// Lower zone: master on channel 0, members on 1..=15.
    pub fn lower_zone() -> Self {
        Self {
            master_channel: 0,
            member_begin: 1,
            member_end: 15,
            bend_range: default_member_bend_range(),
        }
    }

    /// Whether `channel` is a member channel.
    pub fn is_member(&self, channel: u8) -> bool {
        channel != self.master_channel && (self.member_begin..=self.member_end).contains(&channel)
    }
}

/// Engine construction settings.
///
/// # TOML Format
///
/// ```toml
/// polyphony = 8
/// retrigger = "retrigger"
/// pitch_bend_range = 12.0
///
/// [mpe]
/// master_channel = 0
/// member_begin = 1
/// member_end = 15
///
/// [params]
/// filter_cutoff = 1200.0
/// amp_release = 0.5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Voices in the pool.
    pub polyphony: usize,
    /// Capacity of every producer's event queue.
    pub event_queue_capacity: usize,
    /// Capacity of the MIDI inbox.
    pub midi_queue_capacity: usize,
    /// Largest block `initialize` accepts.
    pub max_block_size_limit: usize,
    /// Lowest sample rate `initialize` accepts.
    pub min_sample_rate: f32,
    /// Highest sample rate `initialize` accepts.
    pub max_sample_rate: f32,
    /// Same-note note-on behaviour.
    pub retrigger: RetriggerPolicy,
    /// Channel-wide pitch bend range in semitones.
    pub pitch_bend_range: f32,
    /// MPE zone, if enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpe: Option<MpeConfig>,
    /// Length of the fade applied to a stolen voice's last output.
    pub steal_fade_samples: u32,
    /// Output is clipped to `±output_clip`.
    pub output_clip: f32,
    /// Initial parameter values in plain units, keyed by string id.
    pub params: BTreeMap<String, f32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            polyphony: 16,
            event_queue_capacity: sonant_core::DEFAULT_QUEUE_CAPACITY,
            midi_queue_capacity: 1024,
            max_block_size_limit: 8192,
            min_sample_rate: 8000.0,
            max_sample_rate: 384_000.0,
            retrigger: RetriggerPolicy::default(),
            pitch_bend_range: 2.0,
            mpe: None,
            steal_fade_samples: 64,
            output_clip: 2.8,
            params: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::read_config(path, e))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), polyphony = config.polyphony, "engine config loaded");
        Ok(config)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.polyphony == 0 || self.polyphony > 256 {
            return Err(EngineError::invalid_config("polyphony must be in 1..=256"));
        }
        if self.event_queue_capacity < 2 || self.midi_queue_capacity < 2 {
            return Err(EngineError::invalid_config("queue capacities must be at least 2"));
        }
        if self.max_block_size_limit == 0 {
            return Err(EngineError::invalid_config("max_block_size_limit must be positive"));
        }
        if !(self.min_sample_rate > 0.0 && self.min_sample_rate <= self.max_sample_rate) {
            return Err(EngineError::invalid_config(
                "sample rate bounds must satisfy 0 < min_sample_rate <= max_sample_rate",
            ));
        }
        if !(self.output_clip > 0.0 && self.output_clip.is_finite()) {
            return Err(EngineError::invalid_config("output_clip must be positive and finite"));
        }
        if !(0.0..=96.0).contains(&self.pitch_bend_range) {
            return Err(EngineError::invalid_config("pitch_bend_range must be in 0..=96"));
        }
        if let Some(mpe) = &self.mpe {
            if mpe.master_channel > 15 || mpe.member_end > 15 || mpe.member_begin > mpe.member_end {
                return Err(EngineError::invalid_config(
                    "mpe channels must be in 0..=15 with member_begin <= member_end",
                ));
            }
            if (mpe.member_begin..=mpe.member_end).contains(&mpe.master_channel) {
                return Err(EngineError::invalid_config("mpe master channel overlaps the member range"));
            }
        }
        for name in self.params.keys() {
            if Param::from_string_id(name).is_none() {
                return Err(EngineError::invalid_config(format!("unknown parameter '{name}'")));
            }
        }
        Ok(())
    }

    /// Initial parameter values as `(param, normalized)` pairs.
    pub fn initial_values(&self) -> impl Iterator<Item = (Param, f32)> + '_ {
        self.params.iter().filter_map(|(name, &value)| {
            let param = Param::from_string_id(name)?;
            Some((param, param.descriptor().normalize(value)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_full_toml() {
        let toml = r#"
polyphony = 4
retrigger = "retrigger"
pitch_bend_range = 12.0
steal_fade_samples = 32

[mpe]
master_channel = 0
member_begin = 1
member_end = 7

[params]
filter_cutoff = 1000.0
"#;
        let config = EngineConfig::from_toml(toml).unwrap();
        assert_eq!(config.polyphony, 4);
        assert_eq!(config.retrigger, RetriggerPolicy::Retrigger);
        assert_eq!(config.steal_fade_samples, 32);
        let mpe = config.mpe.unwrap();
        assert_eq!(mpe.member_end, 7);
        assert_eq!(mpe.bend_range, 48.0);
        assert!(mpe.is_member(3));
        assert!(!mpe.is_member(0));
        assert!(!mpe.is_member(9));

        let (param, normalized) = config.initial_values().next().unwrap();
        assert_eq!(param, Param::FilterCutoff);
        assert!((param.descriptor().denormalize(normalized) - 1000.0).abs() < 0.5);
    }

    #[test]
    fn test_rejects_zero_polyphony() {
        let err = EngineConfig::from_toml("polyphony = 0").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_overlapping_mpe_zone() {
        let toml = "[mpe]\nmaster_channel = 3\nmember_begin = 1\nmember_end = 15\n";
        assert!(EngineConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let err = EngineConfig::from_toml("[params]\nwobble = 1.0\n").unwrap_err();
        assert!(err.to_string().contains("wobble"));
    }

    #[test]
    fn test_parse_error_is_typed() {
        let err = EngineConfig::from_toml("polyphony = \"many\"").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "polyphony = 2\noutput_clip = 1.0").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.polyphony, 2);
        assert_eq!(config.output_clip, 1.0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, EngineError::ReadConfig { .. }));
    }
}
