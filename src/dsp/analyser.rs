//! Analysis tap
//!
//! Read-only window onto the signal for visualization consumers. The render
//! loop pushes every frame (mono sum of the two channels) into a ring buffer;
//! consumers clone an [`AnalysisTap`] handle and poll the time-domain window
//! or its magnitude spectrum at their own rate. Reading never disturbs the
//! signal path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Floor for magnitudes of empty bins
pub const MIN_DECIBELS: f32 = -120.0;

#[derive(Debug)]
struct TapRing {
    samples: Vec<f32>,
    write_pos: usize,
    frames_seen: u64,
}

/// Cloneable handle onto the graph's analysis ring buffer
#[derive(Clone)]
pub struct AnalysisTap {
    fft_size: usize,
    ring: Arc<Mutex<TapRing>>,
    /// Forward plan shared by every clone
    fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for AnalysisTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisTap")
            .field("fft_size", &self.fft_size)
            .field("frames_seen", &self.frames_seen())
            .finish()
    }
}

impl AnalysisTap {
    /// `fft_size` is rounded up to a power of two
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2).next_power_of_two();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        Self {
            fft_size,
            fft,
            ring: Arc::new(Mutex::new(TapRing {
                samples: vec![0.0; fft_size],
                write_pos: 0,
                frames_seen: 0,
            })),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of spectrum bins returned by [`frequency_magnitudes`](Self::frequency_magnitudes)
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Total frames pushed since creation
    pub fn frames_seen(&self) -> u64 {
        self.lock().frames_seen
    }

    fn lock(&self) -> MutexGuard<'_, TapRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a block of stereo frames
    pub(crate) fn push_block(&self, left: &[f32], right: &[f32]) {
        let mut ring = self.lock();
        let len = ring.samples.len();
        for (l, r) in left.iter().zip(right) {
            let pos = ring.write_pos;
            ring.samples[pos] = (l + r) * 0.5;
            ring.write_pos = (pos + 1) % len;
        }
        ring.frames_seen += left.len().min(right.len()) as u64;
    }

    /// Most recent `fft_size` samples, oldest first
    pub fn time_domain(&self) -> Vec<f32> {
        let ring = self.lock();
        let (newer, older) = ring.samples.split_at(ring.write_pos);
        older.iter().chain(newer).copied().collect()
    }

    /// Hann-windowed magnitude spectrum of the current window in dB
    ///
    /// Bin `k` covers `k * sample_rate / fft_size` Hz.
    pub fn frequency_magnitudes(&self) -> Vec<f32> {
        let window = self.time_domain();
        let n = window.len();
        let mut buffer: Vec<Complex<f32>> = window
            .iter()
            .enumerate()
            .map(|(i, s)| Complex::new(s * hann(i, n), 0.0))
            .collect();

        self.fft.process(&mut buffer);

        let norm = 2.0 / n as f32;
        buffer[..n / 2]
            .iter()
            .map(|c| {
                let magnitude = c.norm() * norm;
                if magnitude > 0.0 {
                    (20.0 * magnitude.log10()).max(MIN_DECIBELS)
                } else {
                    MIN_DECIBELS
                }
            })
            .collect()
    }

    /// Index of the loudest bin
    pub fn peak_bin(&self) -> usize {
        self.frequency_magnitudes()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[inline]
fn hann(i: usize, n: usize) -> f32 {
    let x = std::f32::consts::TAU * i as f32 / (n - 1).max(1) as f32;
    0.5 - 0.5 * x.cos()
}
