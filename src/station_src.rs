//! Where waveforms come from: a local archive or a seeded synthetic
//! generator.

use std::path::PathBuf;

use ndarray::Array1;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{
    archive::{list_stations, read_station},
    error::{Error, Result},
    trace::{Component, Stats, Trace},
};

/// Data access for the pipeline. Implementations are shared across the
/// per-station workers.
pub trait WaveformSource: Sync {
    /// Station ids (`NET.STA`) available from this source.
    fn stations(&self) -> Result<Vec<String>>;

    /// All traces of one station, any components and events, unordered.
    fn waveforms(&self, station: &str) -> Result<Vec<Trace>>;
}

pub struct ArchiveSource {
    pub root: PathBuf,
}

impl ArchiveSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArchiveSource { root: root.into() }
    }
}

impl WaveformSource for ArchiveSource {
    fn stations(&self) -> Result<Vec<String>> {
        list_stations(&self.root)
    }

    fn waveforms(&self, station: &str) -> Result<Vec<Trace>> {
        read_station(&self.root, station)
    }
}

/// Station of a synthetic network.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticStation {
    pub network: String,
    pub code: String,
    /// Ps-minus-P delay of the sediment conversion, seconds.
    pub delay: f64,
}

impl SyntheticStation {
    pub fn new(network: &str, code: &str, delay: f64) -> Self {
        SyntheticStation {
            network: network.into(),
            code: code.into(),
            delay,
        }
    }

    pub fn id(&self) -> String {
        format!("{}.{}", self.network, self.code)
    }
}

/// Teleseismic P arrivals on a sedimentary site: the radial component
/// carries the direct P plus a stronger sediment Ps conversion, the
/// vertical the direct P alone, with Gaussian noise on every sample.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub stations: Vec<SyntheticStation>,
    pub seed: u64,
    pub n_events: usize,
    pub sampling_rate: f64,
    /// Noise standard deviation relative to the direct-P amplitude.
    pub noise: f64,
    /// Radial amplitudes of the direct P and the Ps conversion.
    pub p_amplitude: f64,
    pub ps_amplitude: f64,
    /// Trace span around the onset, seconds.
    pub span: (f64, f64),
}

impl SyntheticSource {
    pub fn new(stations: Vec<SyntheticStation>, seed: u64) -> Self {
        SyntheticSource {
            stations,
            seed,
            n_events: 8,
            sampling_rate: 10.0,
            noise: 0.01,
            p_amplitude: 0.3,
            ps_amplitude: 0.5,
            span: (-60.0, 90.0),
        }
    }

    fn station_seed(&self, station: &str) -> u64 {
        // FNV-1a keeps per-station streams stable across runs
        station.bytes().fold(0xcbf2_9ce4_8422_2325 ^ self.seed, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        })
    }

    fn pulse(t: f64) -> f64 {
        const WIDTH: f64 = 0.6;
        (-(t * t) / (WIDTH * WIDTH)).exp()
    }

    /// The Z, N and E traces of one event.
    fn event(&self, sta: &SyntheticStation, k: usize, rng: &mut StdRng) -> Result<[Trace; 3]> {
        let normal = Normal::new(0.0, self.noise.max(0.0))
            .map_err(|e| Error::Config(format!("noise level: {e}")))?;

        let back_azimuth: f64 = rng.gen_range(0.0..360.0);
        let distance: f64 = rng.gen_range(35.0..90.0);
        let magnitude: f64 = rng.gen_range(5.6..7.5);
        // crude P-wave ray parameter against distance, s/deg
        let slowness = 8.8 - 0.055 * (distance - 30.0);
        let event_time = 1.0e6 + 4000.0 * k as f64;
        let onset = event_time + 60.0 + 7.0 * distance;

        let dt = 1.0 / self.sampling_rate;
        let n = ((self.span.1 - self.span.0) * self.sampling_rate).round() as usize + 1;
        let starttime = onset + self.span.0;

        let mut z = Array1::zeros(n);
        let mut r = Array1::zeros(n);
        let mut t = Array1::zeros(n);
        for i in 0..n {
            let tau = self.span.0 + i as f64 * dt;
            z[i] = Self::pulse(tau) + normal.sample(rng);
            r[i] = self.p_amplitude * Self::pulse(tau)
                + self.ps_amplitude * Self::pulse(tau - sta.delay)
                + normal.sample(rng);
            t[i] = normal.sample(rng);
        }

        let (sin, cos) = back_azimuth.to_radians().sin_cos();
        let n_comp = r.mapv(|v| -v * cos) + &t.mapv(|v| v * sin);
        let e_comp = r.mapv(|v| -v * sin) - &t.mapv(|v| v * cos);

        let stats = |component| Stats {
            network: sta.network.clone(),
            station: sta.code.clone(),
            component,
            sampling_rate: self.sampling_rate,
            starttime,
            onset,
            back_azimuth,
            slowness,
            distance,
            magnitude,
            event_time,
        };
        Ok([
            Trace::new(stats(Component::Z), z),
            Trace::new(stats(Component::N), n_comp),
            Trace::new(stats(Component::E), e_comp),
        ])
    }
}

impl WaveformSource for SyntheticSource {
    fn stations(&self) -> Result<Vec<String>> {
        Ok(self.stations.iter().map(SyntheticStation::id).collect())
    }

    fn waveforms(&self, station: &str) -> Result<Vec<Trace>> {
        let sta = self
            .stations
            .iter()
            .find(|s| s.id() == station)
            .ok_or_else(|| Error::NoData {
                station: station.to_string(),
            })?;
        let mut rng = StdRng::seed_from_u64(self.station_seed(station));
        let mut out = Vec::with_capacity(3 * self.n_events);
        for k in 0..self.n_events {
            out.extend(self.event(sta, k, &mut rng)?);
        }
        Ok(out)
    }
}
