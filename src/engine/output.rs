//! Output devices
//!
//! The graph renders into [`AudioBuffer`]s; an [`OutputDevice`] consumes
//! them. [`WavOutput`] writes 32-bit float stereo WAV files via `hound`,
//! [`NullOutput`] only counts frames.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use super::buffer::{AudioBuffer, OUTPUT_CHANNELS};
use crate::error::{EntrainError, Result};

pub trait OutputDevice: Send {
    fn name(&self) -> &str;

    /// Consume one rendered block
    fn write(&mut self, block: &AudioBuffer) -> Result<()>;

    /// Hard mute, used by the emergency stop path
    fn silence(&mut self) -> Result<()>;

    /// Lift a previous [`silence`](OutputDevice::silence)
    fn unmute(&mut self) {}

    /// Flush and close; further writes fail
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// WAV file
// ============================================================================

pub struct WavOutput {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
    muted: bool,
}

impl WavOutput {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: OUTPUT_CHANNELS as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            frames_written: 0,
            muted: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputDevice for WavOutput {
    fn name(&self) -> &str {
        "wav"
    }

    fn write(&mut self, block: &AudioBuffer) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| EntrainError::DeviceUnavailable {
            reason: format!("{} is already finalized", self.path.display()),
        })?;
        for (left, right) in block.channel(0).iter().zip(block.channel(1)) {
            let (left, right) = if self.muted { (0.0, 0.0) } else { (*left, *right) };
            writer.write_sample(left)?;
            writer.write_sample(right)?;
        }
        self.frames_written += block.len() as u64;
        Ok(())
    }

    fn silence(&mut self) -> Result<()> {
        self.muted = true;
        Ok(())
    }

    fn unmute(&mut self) {
        self.muted = false;
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

// ============================================================================
// Null device
// ============================================================================

#[derive(Debug, Default)]
pub struct NullOutput {
    frames: u64,
    muted: bool,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl OutputDevice for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn write(&mut self, block: &AudioBuffer) -> Result<()> {
        self.frames += block.len() as u64;
        Ok(())
    }

    fn silence(&mut self) -> Result<()> {
        self.muted = true;
        Ok(())
    }

    fn unmute(&mut self) {
        self.muted = false;
    }
}
