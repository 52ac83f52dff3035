//! Biquad low/high-pass filters with retunable corner frequency.

use std::f32::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BiquadKind {
    LowPass,
    HighPass,
}

#[derive(Clone, Copy, Debug)]
struct BiquadCoefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

/// Interleaved multi-channel biquad.
///
/// Retuning keeps the delay line, so the corner can move while audio flows
/// through without clicks from a state reset.
#[derive(Clone, Debug)]
pub struct Biquad {
    kind: BiquadKind,
    sample_rate: u32,
    channels: usize,
    freq: f32,
    q: f32,
    coeffs: BiquadCoefficients,
    x_n1: Vec<f32>,
    x_n2: Vec<f32>,
    y_n1: Vec<f32>,
    y_n2: Vec<f32>,
}

impl Biquad {
    pub fn new(kind: BiquadKind, sample_rate: u32, channels: usize, freq: f32, q: f32) -> Self {
        let freq = sanitize_freq(freq, sample_rate);
        let q = sanitize_q(q);
        let coeffs = coefficients(kind, sample_rate, freq, q);
        let channels = channels.max(1);
        Self {
            kind,
            sample_rate,
            channels,
            freq,
            q,
            coeffs,
            x_n1: vec![0.0; channels],
            x_n2: vec![0.0; channels],
            y_n1: vec![0.0; channels],
            y_n2: vec![0.0; channels],
        }
    }

    pub fn frequency(&self) -> f32 {
        self.freq
    }

    /// Move the corner frequency. Returns `true` if the coefficients changed.
    pub fn set_frequency(&mut self, freq: f32) -> bool {
        let freq = sanitize_freq(freq, self.sample_rate);
        if (freq - self.freq).abs() < 0.01 {
            return false;
        }
        self.freq = freq;
        self.coeffs = coefficients(self.kind, self.sample_rate, freq, self.q);
        true
    }

    /// Filter one interleaved frame in place.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        for (ch, sample) in frame.iter_mut().enumerate().take(self.channels) {
            *sample = self.tick(ch, *sample);
        }
    }

    /// Filter an interleaved block in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        let channels = self.channels;
        for (idx, sample) in samples.iter_mut().enumerate() {
            *sample = self.tick(idx % channels, *sample);
        }
    }

    #[inline]
    fn tick(&mut self, ch: usize, sample: f32) -> f32 {
        let result = self.coeffs.b0 * sample
            + self.coeffs.b1 * self.x_n1[ch]
            + self.coeffs.b2 * self.x_n2[ch]
            - self.coeffs.a1 * self.y_n1[ch]
            - self.coeffs.a2 * self.y_n2[ch];

        self.x_n2[ch] = self.x_n1[ch];
        self.x_n1[ch] = sample;
        self.y_n2[ch] = self.y_n1[ch];
        self.y_n1[ch] = result;

        result
    }

    pub fn reset(&mut self) {
        self.x_n1.fill(0.0);
        self.x_n2.fill(0.0);
        self.y_n1.fill(0.0);
        self.y_n2.fill(0.0);
    }
}

fn sanitize_freq(freq: f32, sample_rate: u32) -> f32 {
    let nyquist = sample_rate as f32 / 2.0;
    if !freq.is_finite() || nyquist <= 2.0 {
        return 1.0;
    }
    freq.clamp(1.0, nyquist - 1.0)
}

fn sanitize_q(q: f32) -> f32 {
    if !q.is_finite() {
        return 0.5;
    }
    q.clamp(0.1, 10.0)
}

fn coefficients(kind: BiquadKind, sample_rate: u32, freq: f32, q: f32) -> BiquadCoefficients {
    let w0 = 2.0 * PI * freq / sample_rate as f32;
    let cos_w0 = w0.cos();
    let alpha = w0.sin() / (2.0 * q);

    let (b0, b1, b2) = match kind {
        BiquadKind::LowPass => {
            let b1 = 1.0 - cos_w0;
            (b1 / 2.0, b1, b1 / 2.0)
        }
        BiquadKind::HighPass => {
            let b0 = (1.0 + cos_w0) / 2.0;
            (b0, -1.0 - cos_w0, b0)
        }
    };
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;

    BiquadCoefficients {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|n| (2.0 * PI * freq * n as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len().max(1) as f32).sqrt()
    }

    #[test]
    fn low_pass_attenuates_high_frequencies() {
        let mut filter = Biquad::new(BiquadKind::LowPass, 44_100, 1, 400.0, 0.707);
        let mut tone = sine(8_000.0, 44_100, 4_410);
        filter.process(&mut tone);
        assert!(rms(&tone[1_000..]) < 0.05);
    }

    #[test]
    fn high_pass_attenuates_bass() {
        let mut filter = Biquad::new(BiquadKind::HighPass, 44_100, 1, 1_200.0, 0.707);
        let mut tone = sine(60.0, 44_100, 8_820);
        filter.process(&mut tone);
        assert!(rms(&tone[4_000..]) < 0.05);
    }

    #[test]
    fn retune_is_clamped_below_nyquist() {
        let mut filter = Biquad::new(BiquadKind::LowPass, 8_000, 2, 400.0, 0.707);
        assert!(filter.set_frequency(20_000.0));
        assert_eq!(filter.frequency(), 3_999.0);
        assert!(!filter.set_frequency(20_000.0));
    }
}
