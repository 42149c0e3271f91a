//! Single-component time series and the in-place operations the pipeline
//! applies to it.
//!
//! All times are seconds on one shared epoch. Operations mutate in place;
//! callers `clone()` first when the input must survive.

use std::{f64::consts::PI, fmt, str::FromStr};

use itertools_num::linspace;
use ndarray::{s, Array1, ArrayView1};
use num::complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    filter::IirFilter,
    utils::max_abs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    Z,
    N,
    E,
    R,
    T,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Component::Z => 'Z',
            Component::N => 'N',
            Component::E => 'E',
            Component::R => 'R',
            Component::T => 'T',
        };
        write!(f, "{c}")
    }
}

impl FromStr for Component {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().chars().last() {
            Some('Z') => Ok(Component::Z),
            Some('N') => Ok(Component::N),
            Some('E') => Ok(Component::E),
            Some('R') => Ok(Component::R),
            Some('T') => Ok(Component::T),
            _ => Err(Error::Config(format!("unknown component {s:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub network: String,
    pub station: String,
    pub component: Component,
    pub sampling_rate: f64,
    pub starttime: f64,
    /// Direct-P arrival time.
    pub onset: f64,
    #[serde(default)]
    pub back_azimuth: f64,
    /// Ray parameter in s/deg.
    #[serde(default)]
    pub slowness: f64,
    /// Epicentral distance in degrees.
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub magnitude: f64,
    #[serde(default)]
    pub event_time: f64,
}

impl Stats {
    pub fn station_id(&self) -> String {
        format!("{}.{}", self.network, self.station)
    }

    pub fn delta(&self) -> f64 {
        1.0 / self.sampling_rate
    }
}

/// Scalars derived by the quality and picking stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RfMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signoise: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc_conv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rf_r_abs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_abs_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twtt: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detrend {
    /// Remove the line through the first and last sample.
    Simple,
    /// Remove the least-squares line.
    Linear,
    Demean,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub stats: Stats,
    pub meta: RfMeta,
    pub data: Array1<f64>,
}

impl Trace {
    pub fn new(stats: Stats, data: Array1<f64>) -> Self {
        Trace {
            stats,
            meta: RfMeta::default(),
            data,
        }
    }

    pub fn npts(&self) -> usize {
        self.data.len()
    }

    pub fn component(&self) -> Component {
        self.stats.component
    }

    pub fn endtime(&self) -> f64 {
        self.stats.starttime + self.npts().saturating_sub(1) as f64 * self.stats.delta()
    }

    /// Sample times relative to the start time.
    pub fn times(&self) -> Array1<f64> {
        let n = self.npts();
        let span = n.saturating_sub(1) as f64 * self.stats.delta();
        linspace(0.0, span, n).collect()
    }

    /// Onset minus start time.
    pub fn onset_offset(&self) -> f64 {
        self.stats.onset - self.stats.starttime
    }

    /// Sample nearest to the onset, if inside the trace.
    pub fn onset_index(&self) -> Option<usize> {
        let i = (self.onset_offset() * self.stats.sampling_rate).round();
        (i >= 0.0 && (i as usize) < self.npts()).then(|| i as usize)
    }

    /// Samples whose time lies in `[onset + rel0, onset + rel1]`, bounds
    /// inclusive.
    pub fn window(&self, rel0: f64, rel1: f64) -> ArrayView1<f64> {
        let (t0, t1) = (self.onset_offset() + rel0, self.onset_offset() + rel1);
        let times = self.times();
        let first = times.iter().position(|&t| t >= t0);
        let last = times.iter().rposition(|&t| t <= t1);
        match (first, last) {
            (Some(i0), Some(i1)) if i0 <= i1 => self.data.slice(s![i0..=i1]),
            _ => self.data.slice(s![0..0]),
        }
    }

    pub fn max(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn max_abs(&self) -> f64 {
        max_abs(self.data.view())
    }

    pub fn detrend(&mut self, kind: Detrend) -> &mut Self {
        let n = self.npts();
        if n == 0 {
            return self;
        }
        match kind {
            Detrend::Demean => {
                let mean = self.data.sum() / n as f64;
                self.data.mapv_inplace(|v| v - mean);
            }
            Detrend::Simple => {
                let x0 = self.data[0];
                let slope = if n > 1 {
                    (self.data[n - 1] - x0) / (n - 1) as f64
                } else {
                    0.0
                };
                self.data
                    .iter_mut()
                    .enumerate()
                    .for_each(|(i, v)| *v -= x0 + slope * i as f64);
            }
            Detrend::Linear => {
                let nf = n as f64;
                let mean_i = (nf - 1.0) / 2.0;
                let mean_x = self.data.sum() / nf;
                let (sxy, sxx) = self.data.iter().enumerate().fold(
                    (0.0, 0.0),
                    |(sxy, sxx), (i, &v)| {
                        let di = i as f64 - mean_i;
                        (sxy + di * (v - mean_x), sxx + di * di)
                    },
                );
                let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
                self.data
                    .iter_mut()
                    .enumerate()
                    .for_each(|(i, v)| *v -= mean_x + slope * (i as f64 - mean_i));
            }
        }
        self
    }

    /// Hann taper on both ends, over `max_percentage` of the trace or
    /// `max_length` seconds, whichever is shorter.
    pub fn taper(&mut self, max_percentage: f64, max_length: Option<f64>) -> &mut Self {
        let n = self.npts();
        let mut half = max_percentage * n as f64;
        if let Some(len) = max_length {
            half = half.min(len * self.stats.sampling_rate);
        }
        let wlen = (half.max(0.0) as usize).min(n / 2);
        for i in 0..wlen {
            let w = 0.5 * (1.0 - (PI * i as f64 / wlen as f64).cos());
            self.data[i] *= w;
            self.data[n - 1 - i] *= w;
        }
        self
    }

    pub fn bandpass(
        &mut self,
        freqmin: f64,
        freqmax: f64,
        corners: usize,
        zerophase: bool,
    ) -> Result<&mut Self> {
        let mut filter =
            IirFilter::butterworth_bandpass(corners, freqmin, freqmax, self.stats.sampling_rate)?;
        let mut buf = self.data.to_vec();
        if zerophase {
            filter.filtfilt(&mut buf);
        } else {
            filter.filter(&mut buf);
        }
        self.data = Array1::from(buf);
        Ok(self)
    }

    /// Cut to the samples nearest `[t0, t1]` (absolute times). A window
    /// outside the trace leaves it empty.
    pub fn trim(&mut self, t0: f64, t1: f64) -> &mut Self {
        let n = self.npts() as isize;
        let sr = self.stats.sampling_rate;
        let i0 = (((t0 - self.stats.starttime) * sr).round() as isize).max(0);
        let i1 = (((t1 - self.stats.starttime) * sr).round() as isize).min(n - 1);
        if i0 > i1 || n == 0 {
            self.stats.starttime += i0 as f64 / sr;
            self.data = Array1::zeros(0);
            return self;
        }
        self.data = self.data.slice(s![i0..=i1]).to_owned();
        self.stats.starttime += i0 as f64 / sr;
        self
    }

    /// `trim` relative to the onset.
    pub fn trim2(&mut self, rel0: f64, rel1: f64) -> &mut Self {
        let onset = self.stats.onset;
        self.trim(onset + rel0, onset + rel1)
    }

    /// Fourier resampling to `rate` Hz.
    pub fn resample(&mut self, rate: f64) -> Result<&mut Self> {
        if !(rate > 0.0) {
            return Err(Error::Config(format!("resample rate {rate} Hz")));
        }
        let n = self.npts();
        if n == 0 || rate == self.stats.sampling_rate {
            self.stats.sampling_rate = rate;
            return Ok(self);
        }
        let m = ((n as f64) * rate / self.stats.sampling_rate).round() as usize;
        if m == 0 {
            return Err(Error::Degenerate(format!(
                "resampling {n} samples to {rate} Hz leaves nothing"
            )));
        }

        let mut planner = FftPlanner::<f64>::new();
        let mut spec: Vec<_> = self.data.iter().map(|&v| Complex::new(v, 0.0)).collect();
        planner.plan_fft_forward(n).process(&mut spec);

        let half = n.min(m) / 2;
        let mut out = vec![Complex::new(0.0, 0.0); m];
        out[..half.max(1)].copy_from_slice(&spec[..half.max(1)]);
        for k in 1..half {
            out[m - k] = spec[n - k];
        }
        planner.plan_fft_inverse(m).process(&mut out);

        let scale = 1.0 / n as f64;
        self.data = out.iter().map(|c| c.re * scale).collect();
        self.stats.sampling_rate = rate;
        Ok(self)
    }
}
