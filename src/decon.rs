//! Receiver functions by deconvolving the vertical from the horizontal
//! components.
//!
//! Two methods are provided:
//!
//! - **time**: Wiener spiking deconvolution. The normal equations built from
//!   the source autocorrelation (normalised to lag 0, plus a spiking term on
//!   the diagonal) and the response/source cross-correlation are solved by
//!   Levinson recursion.
//! - **freq**: spectral division with a water level and a Gaussian low-pass.
//!
//! In both cases lag 0 lands on the onset sample, and all three outputs are
//! scaled by the peak of the vertical (source) receiver function.

use ndarray::{Array1, ArrayView1};
use num::complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::{
    cfg::RfCfg,
    error::{Error, Result},
    moveout::moveout,
    stream::ThreeComponent,
    trace::{Component, RfMeta},
    utils::{fftfreq, max_abs, next_pow2, solve_toeplitz},
    validate::slope_ratio,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeconMethod {
    Time,
    Freq,
}

impl Default for DeconMethod {
    fn default() -> Self {
        DeconMethod::Time
    }
}

/// Autocorrelation for lags `0..num`.
fn acorrt(x: ArrayView1<f64>, num: usize) -> Vec<f64> {
    let n = x.len();
    (0..num)
        .map(|lag| {
            if lag >= n {
                0.0
            } else {
                (0..n - lag).map(|i| x[i] * x[i + lag]).sum()
            }
        })
        .collect()
}

/// Cross-correlation `sum_n a[n + k - zerolag] * b[n]` for `k in 0..num`.
fn xcorrt(a: ArrayView1<f64>, b: ArrayView1<f64>, num: usize, zerolag: usize) -> Vec<f64> {
    let (na, nb) = (a.len() as isize, b.len() as isize);
    (0..num)
        .map(|k| {
            let lag = k as isize - zerolag as isize;
            let lo = 0.max(-lag);
            let hi = nb.min(na - lag);
            (lo..hi.max(lo))
                .map(|n| a[(n + lag) as usize] * b[n as usize])
                .sum()
        })
        .collect()
}

fn normalize(rfs: &mut [Array1<f64>]) -> Result<()> {
    let norm = rfs.first().map(|rf| max_abs(rf.view())).unwrap_or(0.0);
    if norm == 0.0 || !norm.is_finite() {
        return Err(Error::Degenerate("source receiver function is flat".into()));
    }
    rfs.iter_mut().for_each(|rf| rf.mapv_inplace(|v| v / norm));
    Ok(())
}

/// Time-domain deconvolution. The first response is the one used for
/// normalisation (the source itself in the usual Z, R, T order).
pub fn deconv_time(
    responses: &[ArrayView1<f64>],
    source: ArrayView1<f64>,
    shift: usize,
    spiking: f64,
) -> Result<Vec<Array1<f64>>> {
    let length = source.len();
    let mut sts = acorrt(source, length);
    if sts.first().copied().unwrap_or(0.0) == 0.0 {
        return Err(Error::Degenerate("source component has no energy".into()));
    }
    let s0 = sts[0];
    sts.iter_mut().for_each(|v| *v /= s0);
    sts[0] += spiking;

    let mut rfs = responses
        .iter()
        .map(|rsp| {
            let str_ = xcorrt(*rsp, source, length, shift);
            solve_toeplitz(&sts, &str_).map(Array1::from)
        })
        .collect::<Result<Vec<_>>>()?;
    normalize(&mut rfs)?;
    Ok(rfs)
}

/// Frequency-domain water-level deconvolution with a Gaussian filter of
/// width `gauss` (rad/s).
pub fn deconv_freq(
    responses: &[ArrayView1<f64>],
    source: ArrayView1<f64>,
    shift: usize,
    water_level: f64,
    gauss: f64,
    sampling_rate: f64,
) -> Result<Vec<Array1<f64>>> {
    let n = source.len();
    if n == 0 {
        return Err(Error::Degenerate("empty source component".into()));
    }
    let nfft = 2 * next_pow2(n);
    let mut planner = FftPlanner::<f64>::new();
    let fwd = planner.plan_fft_forward(nfft);
    let inv = planner.plan_fft_inverse(nfft);

    let spectrum = |x: ArrayView1<f64>| {
        let mut buf = vec![Complex::new(0.0, 0.0); nfft];
        buf.iter_mut()
            .zip(x.iter())
            .for_each(|(b, &v)| *b = Complex::new(v, 0.0));
        fwd.process(&mut buf);
        buf
    };

    let src = spectrum(source);
    let power: Vec<f64> = src.iter().map(|c| c.norm_sqr()).collect();
    let peak = power.iter().cloned().fold(0.0, f64::max);
    if peak == 0.0 {
        return Err(Error::Degenerate("source component has no energy".into()));
    }
    let floor = water_level * peak;
    let gaussian: Vec<f64> = fftfreq::<f64>(nfft)
        .into_iter()
        .map(|f| {
            let w = 2.0 * PI * f * sampling_rate;
            (-(w * w) / (4.0 * gauss * gauss)).exp()
        })
        .collect();

    let mut rfs = Vec::with_capacity(responses.len());
    for rsp in responses {
        let r = spectrum(*rsp);
        let mut q: Vec<Complex<f64>> = r
            .iter()
            .zip(src.iter())
            .zip(power.iter().zip(gaussian.iter()))
            .map(|((&rv, &sv), (&p, &g))| rv * sv.conj() / p.max(floor) * g)
            .collect();
        inv.process(&mut q);
        let scale = 1.0 / nfft as f64;
        let rf: Array1<f64> = (0..n)
            .map(|i| q[(i + nfft - shift % nfft) % nfft].re * scale)
            .collect();
        rfs.push(rf);
    }
    normalize(&mut rfs)?;
    Ok(rfs)
}

/// Receiver functions of a rotated (Z, R, T) group, optionally moveout
/// corrected, each annotated with its slope ratio.
pub fn receiver_function(group: &ThreeComponent, cfg: &RfCfg) -> Result<ThreeComponent> {
    if !group.is_aligned() {
        return Err(Error::Degenerate("components differ in length".into()));
    }
    let order = [Component::Z, Component::R, Component::T];
    let mut traces = Vec::with_capacity(3);
    for c in order {
        let tr = group
            .select(c)
            .ok_or_else(|| Error::Degenerate(format!("group lacks component {c}")))?;
        traces.push(tr);
    }
    let source = traces[0];
    let shift = source
        .onset_index()
        .ok_or_else(|| Error::Degenerate("onset outside trace".into()))?;
    let views: Vec<_> = traces.iter().map(|t| t.data.view()).collect();

    let rfs = match cfg.method {
        DeconMethod::Time => deconv_time(&views, source.data.view(), shift, cfg.spiking)?,
        DeconMethod::Freq => deconv_freq(
            &views,
            source.data.view(),
            shift,
            cfg.water_level,
            cfg.gauss,
            source.stats.sampling_rate,
        )?,
    };

    let mut out = Vec::with_capacity(3);
    for (tr, data) in traces.into_iter().zip(rfs) {
        let mut rf = tr.clone();
        rf.data = data;
        rf.meta = RfMeta {
            signoise: tr.meta.signoise,
            ..RfMeta::default()
        };
        if cfg.moveout {
            moveout(&mut rf, cfg.reference_slowness)?;
        }
        rf.meta.slope_ratio = Some(slope_ratio(&rf));
        out.push(rf);
    }
    let arr = <[_; 3]>::try_from(out)
        .map_err(|_| Error::Degenerate("deconvolution lost a component".into()))?;
    ThreeComponent::new(arr)
}
