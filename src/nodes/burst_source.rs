use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::core::SampleFrame;

const DEFAULT_SEED: u64 = 0x5eed;

/// Synthetic I/Q source: a low noise floor with a periodic high-power tone
/// burst at the start of every `burst_every`-th frame.
pub struct BurstSource {
    frame_size: usize,
    vector_len: usize,
    sample_rate: f64,
    frequency: f64,
    noise_amplitude: f32,
    burst_amplitude: f32,
    burst_every: u64,
    burst_len: usize,
    phase: f64,
    sequence: u64,
    rng: StdRng,
}

impl BurstSource {
    /// `frame_size` is in items of `vector_len` values.
    pub fn new(frame_size: usize, vector_len: usize) -> Self {
        Self {
            frame_size,
            vector_len: vector_len.max(1),
            sample_rate: 1_000_000.0,
            frequency: 10_000.0,
            noise_amplitude: 0.01,
            burst_amplitude: 10.0,
            burst_every: 50,
            burst_len: 64,
            phase: 0.0,
            sequence: 0,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_noise(mut self, amplitude: f32) -> Self {
        self.noise_amplitude = amplitude.abs();
        self
    }

    /// Burst every `every` frames (0 disables bursts)
    pub fn with_burst(mut self, amplitude: f32, every: u64, len: usize) -> Self {
        self.burst_amplitude = amplitude;
        self.burst_every = every;
        self.burst_len = len;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn is_burst_frame(&self) -> bool {
        self.burst_every > 0 && self.sequence % self.burst_every == self.burst_every - 1
    }

    pub fn next_frame(&mut self) -> SampleFrame {
        let burst = self.is_burst_frame();
        let phase_increment = 2.0 * PI * self.frequency / self.sample_rate;
        let mut samples = Vec::with_capacity(self.frame_size * self.vector_len);

        for i in 0..self.frame_size {
            let tone = burst && i < self.burst_len;
            for _ in 0..self.vector_len {
                let sample = if tone {
                    Complex32::from_polar(self.burst_amplitude, self.phase as f32)
                } else {
                    let noise = self.noise_amplitude;
                    Complex32::new(
                        self.rng.gen_range(-noise..=noise),
                        self.rng.gen_range(-noise..=noise),
                    )
                };
                samples.push(sample);
            }
            self.phase = (self.phase + phase_increment) % (2.0 * PI);
        }

        let elapsed_items = self.sequence as f64 * self.frame_size as f64;
        let timestamp = (elapsed_items * 1e6 / self.sample_rate) as u64;
        let frame = SampleFrame::new(timestamp, self.sequence, self.vector_len, samples);
        self.sequence += 1;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_power(frame: &SampleFrame) -> f32 {
        frame.items().map(|item| item[0].norm_sqr()).fold(0.0, f32::max)
    }

    #[test]
    fn test_frame_shape() {
        let mut source = BurstSource::new(128, 2);
        let frame = source.next_frame();

        assert_eq!(frame.item_count(), 128);
        assert_eq!(frame.samples.len(), 256);
        assert_eq!(frame.sequence_id, 0);
    }

    #[test]
    fn test_bursts_only_on_schedule() {
        let mut source = BurstSource::new(100, 1).with_noise(0.1).with_burst(5.0, 3, 10);

        let quiet = source.next_frame();
        let _ = source.next_frame();
        let loud = source.next_frame();

        assert!(peak_power(&quiet) <= 0.02 + f32::EPSILON);
        assert!((peak_power(&loud) - 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_same_seed_same_noise() {
        let mut a = BurstSource::new(16, 1).with_seed(7);
        let mut b = BurstSource::new(16, 1).with_seed(7);
        assert_eq!(a.next_frame().samples, b.next_frame().samples);
    }
}
