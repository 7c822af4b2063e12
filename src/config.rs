//! Engine configuration
//!
//! All tunables of the engine live in [`EngineConfig`]. The struct is plain
//! serde data so it can be loaded from a JSON file; every field has a default
//! and [`EngineConfig::validate`] rejects values outside the supported range.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dsp::CompressorSettings;
use crate::error::{EntrainError, Result};

/// Hard upper bound for the master volume ceiling (linear amplitude)
pub const ABSOLUTE_MAX_CEILING: f32 = 1.0;

/// Supported sample rates
const SAMPLE_RATES: [u32; 4] = [22050, 44100, 48000, 96000];

/// Configuration for an [`EntrainmentEngine`](crate::engine::EntrainmentEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Frames rendered per block
    pub block_size: usize,
    /// Sequencer tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Number of harmonic layers (fundamental included)
    pub harmonic_layers: usize,
    /// Initial master volume (0 to 1, capped at `volume_ceiling`)
    pub master_volume: f32,
    /// Safety ceiling for the master output amplitude
    pub volume_ceiling: f32,
    /// Default ramp for caller parameter changes
    pub default_ramp_seconds: f64,
    /// Ramp used when the sequencer pushes a new beat frequency
    pub tick_ramp_seconds: f64,
    /// Ramp used for preset and phase transitions
    pub transition_ramp_seconds: f64,
    /// Master fade used by pause/resume/stop
    pub pause_fade_seconds: f64,
    /// Default fade for noise layers
    pub noise_fade_seconds: f64,
    /// Length of the looped noise buffers
    pub noise_loop_seconds: f64,
    /// Enable the reverb send
    pub reverb_enabled: bool,
    /// Reverb wet level
    pub reverb_wet: f32,
    /// Compressor on the summed signal
    pub compressor: CompressorSettings,
    /// FFT size of the analysis tap (power of two)
    pub analysis_fft_size: usize,
    /// Directory used as durable fallback for failed persistence writes
    pub spool_dir: Option<PathBuf>,
    /// Fixed seed for the noise generators (random when absent)
    pub noise_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 480,
            tick_interval_ms: 100,
            harmonic_layers: 3,
            master_volume: 0.5,
            volume_ceiling: 0.8,
            default_ramp_seconds: 0.1,
            tick_ramp_seconds: 0.15,
            transition_ramp_seconds: 2.0,
            pause_fade_seconds: 0.5,
            noise_fade_seconds: 2.0,
            noise_loop_seconds: 4.0,
            reverb_enabled: true,
            reverb_wet: 0.15,
            compressor: CompressorSettings::default(),
            analysis_fft_size: 2048,
            spool_dir: None,
            noise_seed: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Sample rate as f64, the unit used by the DSP code
    pub fn sample_rate_f64(&self) -> f64 {
        self.sample_rate as f64
    }

    /// Validate all values against the supported ranges
    pub fn validate(&self) -> Result<()> {
        if !SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(EntrainError::invalid_parameter(
                "sample_rate",
                self.sample_rate,
                "one of 22050, 44100, 48000, 96000",
            ));
        }
        if self.block_size == 0 || self.block_size > 8192 {
            return Err(EntrainError::invalid_parameter(
                "block_size",
                self.block_size,
                "1 to 8192 frames",
            ));
        }
        if !(10..=1000).contains(&self.tick_interval_ms) {
            return Err(EntrainError::invalid_parameter(
                "tick_interval_ms",
                self.tick_interval_ms,
                "10 to 1000 ms",
            ));
        }
        if !(1..=8).contains(&self.harmonic_layers) {
            return Err(EntrainError::invalid_parameter(
                "harmonic_layers",
                self.harmonic_layers,
                "1 to 8",
            ));
        }
        if !(0.0..=ABSOLUTE_MAX_CEILING).contains(&self.volume_ceiling) || self.volume_ceiling == 0.0
        {
            return Err(EntrainError::invalid_parameter(
                "volume_ceiling",
                self.volume_ceiling,
                "greater than 0 and at most 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.master_volume) {
            return Err(EntrainError::invalid_parameter(
                "master_volume",
                self.master_volume,
                "0.0 to 1.0",
            ));
        }
        for (name, value) in [
            ("default_ramp_seconds", self.default_ramp_seconds),
            ("tick_ramp_seconds", self.tick_ramp_seconds),
            ("transition_ramp_seconds", self.transition_ramp_seconds),
            ("pause_fade_seconds", self.pause_fade_seconds),
            ("noise_fade_seconds", self.noise_fade_seconds),
        ] {
            if !(0.0..=30.0).contains(&value) {
                return Err(EntrainError::invalid_parameter(name, value, "0 to 30 seconds"));
            }
        }
        if !(0.5..=60.0).contains(&self.noise_loop_seconds) {
            return Err(EntrainError::invalid_parameter(
                "noise_loop_seconds",
                self.noise_loop_seconds,
                "0.5 to 60 seconds",
            ));
        }
        if !(0.0..=1.0).contains(&self.reverb_wet) {
            return Err(EntrainError::invalid_parameter(
                "reverb_wet",
                self.reverb_wet,
                "0.0 to 1.0",
            ));
        }
        if !self.analysis_fft_size.is_power_of_two()
            || !(32..=32768).contains(&self.analysis_fft_size)
        {
            return Err(EntrainError::invalid_parameter(
                "analysis_fft_size",
                self.analysis_fft_size,
                "a power of two between 32 and 32768",
            ));
        }
        self.compressor.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_ceiling_above_unity() {
        let config = EngineConfig {
            volume_ceiling: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_rejects_non_power_of_two_fft() {
        let config = EngineConfig {
            analysis_fft_size: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "sample_rate": 44100, "harmonic_layers": 2 }"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.harmonic_layers, 2);
        assert_eq!(config.tick_interval_ms, 100);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let config = EngineConfig {
            master_volume: 0.3,
            noise_seed: Some(7),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
