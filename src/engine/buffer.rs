//! Audio Buffer Management
//!
//! Stereo, planar f32 buffers used for every render block. The engine always
//! renders two channels: index 0 is left, index 1 is right.

// ============================================================================
// Constants
// ============================================================================

/// Number of output channels
pub const OUTPUT_CHANNELS: usize = 2;

/// Left channel index
pub const LEFT: usize = 0;

/// Right channel index
pub const RIGHT: usize = 1;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `f32::NEG_INFINITY` for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Planar stereo audio buffer
///
/// # Example
/// ```
/// use entrain::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::new(480, 48000);
/// assert_eq!(buffer.num_channels(), 2);
/// assert_eq!(buffer.len(), 480);
/// ```
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent stereo buffer
    pub fn new(num_samples: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; OUTPUT_CHANNELS],
            sample_rate,
        }
    }

    /// Number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Samples of one channel
    ///
    /// # Panics
    /// Panics if `index` is out of bounds
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Mutable samples of one channel
    ///
    /// # Panics
    /// Panics if `index` is out of bounds
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Set one frame (left, right)
    #[inline]
    pub fn set_frame(&mut self, index: usize, left: f32, right: f32) {
        if index < self.len() {
            self.samples[LEFT][index] = left;
            self.samples[RIGHT][index] = right;
        }
    }

    /// Get one frame (left, right)
    #[inline]
    pub fn frame(&self, index: usize) -> Option<(f32, f32)> {
        if index < self.len() {
            Some((self.samples[LEFT][index], self.samples[RIGHT][index]))
        } else {
            None
        }
    }

    /// Zero every sample
    pub fn clear(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Interleave to L, R, L, R, ...
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.len() * self.num_channels());
        for index in 0..self.len() {
            for channel in &self.samples {
                interleaved.push(channel[index]);
            }
        }
        interleaved
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// RMS level in dB across all channels
    pub fn rms_db(&self) -> f32 {
        let total = self.len() * self.num_channels();
        if total == 0 {
            return f32::NEG_INFINITY;
        }
        let sum_squares: f64 = self
            .samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        linear_to_db((sum_squares / total as f64).sqrt() as f32)
    }

    /// Check that no sample is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .all(|s| s.is_finite())
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, 48000)
    }
}
