//! Butterworth IIR filters as cascaded biquad sections.
//!
//! Sections are designed by the bilinear transform with frequency
//! pre-warping. A bandpass is a highpass at the lower corner followed by a
//! lowpass at the upper corner, each of the requested order.

use std::f64::consts::PI;

use tracing::warn;

use crate::error::{Error, Result};

/// Second-order section, Direct Form II Transposed.
///
/// H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)
#[derive(Debug, Clone)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    state: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self {
            b,
            a,
            state: [0.0; 2],
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b[0] * input + self.state[0];
        self.state[0] = self.b[1] * input - self.a[0] * output + self.state[1];
        self.state[1] = self.b[2] * input - self.a[1] * output;
        output
    }

    pub fn reset(&mut self) {
        self.state = [0.0; 2];
    }

    /// Poles inside the unit circle.
    #[cfg(test)]
    fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Lowpass,
    Highpass,
}

/// Cascade of biquads.
#[derive(Debug, Clone)]
pub struct IirFilter {
    sections: Vec<Biquad>,
}

impl IirFilter {
    #[cfg(test)]
    fn butterworth_lowpass(order: usize, cutoff_hz: f64, sample_rate: f64) -> Self {
        Self {
            sections: design(order, cutoff_hz, sample_rate, Kind::Lowpass),
        }
    }

    #[cfg(test)]
    fn butterworth_highpass(order: usize, cutoff_hz: f64, sample_rate: f64) -> Self {
        Self {
            sections: design(order, cutoff_hz, sample_rate, Kind::Highpass),
        }
    }

    /// Bandpass between `low_hz` and `high_hz`.
    ///
    /// An upper corner at or above Nyquist degrades the filter to a
    /// highpass, with a warning.
    pub fn butterworth_bandpass(
        order: usize,
        low_hz: f64,
        high_hz: f64,
        sample_rate: f64,
    ) -> Result<Self> {
        let nyquist = sample_rate / 2.0;
        if order == 0 {
            return Err(Error::InvalidFilter("filter order must be positive".into()));
        }
        if !(low_hz > 0.0 && low_hz < high_hz) {
            return Err(Error::InvalidFilter(format!(
                "band edges {low_hz}..{high_hz} Hz"
            )));
        }
        if low_hz >= nyquist {
            return Err(Error::InvalidFilter(format!(
                "lower corner {low_hz} Hz at or above Nyquist {nyquist} Hz"
            )));
        }
        let mut sections = design(order, low_hz, sample_rate, Kind::Highpass);
        if high_hz >= nyquist {
            warn!(high_hz, nyquist, "upper corner above Nyquist, applying highpass only");
        } else {
            sections.extend(design(order, high_hz, sample_rate, Kind::Lowpass));
        }
        Ok(Self { sections })
    }

    pub fn reset(&mut self) {
        self.sections.iter_mut().for_each(Biquad::reset);
    }

    pub fn process(&mut self, input: f64) -> f64 {
        self.sections
            .iter_mut()
            .fold(input, |x, section| section.process(x))
    }

    /// Causal filtering of a block, starting from rest.
    pub fn filter(&mut self, x: &mut [f64]) {
        self.reset();
        x.iter_mut().for_each(|v| *v = self.process(*v));
    }

    /// Forward-backward filtering (zero phase, squared magnitude response).
    pub fn filtfilt(&mut self, x: &mut [f64]) {
        self.filter(x);
        x.reverse();
        self.filter(x);
        x.reverse();
    }

    #[cfg(test)]
    fn is_stable(&self) -> bool {
        self.sections.iter().all(Biquad::is_stable)
    }
}

fn design(order: usize, cutoff_hz: f64, sample_rate: f64, kind: Kind) -> Vec<Biquad> {
    let k = (PI * cutoff_hz / sample_rate).tan();
    let mut sections: Vec<Biquad> = (0..order / 2)
        .map(|i| {
            let theta = PI * (2 * i + 1) as f64 / (2 * order) as f64;
            let q = 1.0 / (2.0 * theta.cos());
            second_order(k, q, kind)
        })
        .collect();
    if order % 2 == 1 {
        sections.push(first_order(k, kind));
    }
    sections
}

fn second_order(k: f64, q: f64, kind: Kind) -> Biquad {
    let norm = 1.0 / (1.0 + k / q + k * k);
    let a = [2.0 * (k * k - 1.0) * norm, (1.0 - k / q + k * k) * norm];
    let b = match kind {
        Kind::Lowpass => {
            let b0 = k * k * norm;
            [b0, 2.0 * b0, b0]
        }
        Kind::Highpass => [norm, -2.0 * norm, norm],
    };
    Biquad::new(b, a)
}

fn first_order(k: f64, kind: Kind) -> Biquad {
    let a1 = (k - 1.0) / (k + 1.0);
    let b = match kind {
        Kind::Lowpass => {
            let b0 = k / (1.0 + k);
            [b0, b0, 0.0]
        }
        Kind::Highpass => {
            let b0 = 1.0 / (1.0 + k);
            [b0, -b0, 0.0]
        }
    };
    Biquad::new(b, [a1, 0.0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn bandpass_keeps_passband_and_rejects_outside() {
        let fs = 20.0;
        let mut f = IirFilter::butterworth_bandpass(4, 0.1, 1.0, fs).unwrap();
        assert!(f.is_stable());

        let mut inband = sine(0.4, fs, 4000);
        f.filtfilt(&mut inband);
        let mut high = sine(5.0, fs, 4000);
        f.filtfilt(&mut high);

        // skip edges
        let mid = 1000..3000;
        assert!(rms(&inband[mid.clone()]) > 0.6);
        assert!(rms(&high[mid]) < 0.01);
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut f = IirFilter::butterworth_lowpass(3, 1.0, 10.0);
        let mut x = vec![1.0; 500];
        f.filter(&mut x);
        assert!((x[499] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = IirFilter::butterworth_highpass(4, 0.5, 10.0);
        let mut x = vec![1.0; 2000];
        f.filter(&mut x);
        assert!(x[1999].abs() < 1e-6);
    }

    #[test]
    fn invalid_band_rejected() {
        assert!(IirFilter::butterworth_bandpass(4, 1.0, 0.1, 10.0).is_err());
        assert!(IirFilter::butterworth_bandpass(4, 0.0, 1.0, 10.0).is_err());
        assert!(IirFilter::butterworth_bandpass(4, 6.0, 8.0, 10.0).is_err());
        assert!(IirFilter::butterworth_bandpass(0, 0.1, 1.0, 10.0).is_err());
        // upper corner above Nyquist degrades to highpass
        assert!(IirFilter::butterworth_bandpass(4, 0.1, 8.0, 10.0).is_ok());
    }
}
