//! Per-record quality metrics for receiver functions.
//!
//! - slope ratio: steepness of the direct-P onset against pre-onset noise
//! - `cc_conv`: the radial RF reconvolved with the observed vertical should
//!   reproduce the observed radial
//! - direct P: the largest radial-RF peak should be the direct P itself

use tracing::{debug, warn};

use crate::{
    cfg::ValidationCfg,
    constants::{DIRECT_P_TRIM, DIRECT_P_WINDOW, SLOPE_P_WINDOW, SLOPE_REF_WINDOW},
    error::{Error, Result},
    stream::{sort_by_onset, ThreeComponent},
    trace::{Component, Detrend, Trace},
    utils::{convolve_full, corrcoef, max_abs},
};

fn slopes(samples: &[f64], sampling_rate: f64) -> Vec<f64> {
    samples
        .windows(2)
        .map(|w| (w[1] - w[0]) * sampling_rate)
        .collect()
}

/// Peak |dA/dt| around the onset over the RMS |dA/dt| before it.
/// 0.0 when either window is too short or the reference is silent.
pub fn slope_ratio(trace: &Trace) -> f64 {
    let sr = trace.stats.sampling_rate;
    let p = slopes(
        &trace.window(SLOPE_P_WINDOW.0, SLOPE_P_WINDOW.1).to_vec(),
        sr,
    );
    let reference = slopes(
        &trace.window(SLOPE_REF_WINDOW.0, SLOPE_REF_WINDOW.1).to_vec(),
        sr,
    );
    if p.is_empty() || reference.is_empty() {
        return 0.0;
    }
    let peak = p.iter().fold(0.0, |m: f64, v| m.max(v.abs()));
    let rms = (reference.iter().map(|v| v * v).sum::<f64>() / reference.len() as f64).sqrt();
    if rms == 0.0 || !rms.is_finite() {
        0.0
    } else {
        peak / rms
    }
}

/// Output of [`calc_cc_conv`].
#[derive(Debug)]
pub struct CcConv {
    /// Raw (unsquared) correlation per successfully checked triple.
    pub cc: Vec<f64>,
    /// The receiver functions, sorted by onset, radial traces annotated
    /// with `cc_conv` where it could be computed.
    pub rfs: Vec<ThreeComponent>,
    /// Triples that could not be checked, by position in `rfs`.
    pub skipped: Vec<(usize, Error)>,
}

/// Reconvolution check of every receiver-function triple against the
/// seismograms it came from.
///
/// `rfs` and `signals` are matched after sorting both by onset. A count
/// mismatch returns `rfs` unmodified with no correlations.
pub fn calc_cc_conv(
    mut rfs: Vec<ThreeComponent>,
    signals: &[ThreeComponent],
    cfg: &ValidationCfg,
) -> CcConv {
    if rfs.len() != signals.len() {
        warn!(
            rfs = rfs.len(),
            signals = signals.len(),
            "receiver function and signal counts differ, skipping cc_conv"
        );
        return CcConv {
            cc: vec![],
            rfs,
            skipped: vec![],
        };
    }
    sort_by_onset(&mut rfs);
    let mut sig_all = signals.to_vec();
    sort_by_onset(&mut sig_all);

    let mut cc = Vec::with_capacity(rfs.len());
    let mut skipped = Vec::new();
    for (i, (rf, sig)) in rfs.iter_mut().zip(sig_all.iter_mut()).enumerate() {
        match triple_cc(rf, sig, cfg) {
            Ok((squared, raw)) => {
                if let Some(r) = rf.select_mut(Component::R) {
                    r.meta.cc_conv = Some(squared);
                }
                cc.push(raw);
            }
            Err(err) => {
                debug!(index = i, %err, "cc_conv skipped");
                skipped.push((i, err));
            }
        }
    }
    CcConv { cc, rfs, skipped }
}

/// (squared-amplitude correlation, raw correlation) for one triple.
fn triple_cc(rf: &ThreeComponent, sig: &mut ThreeComponent, cfg: &ValidationCfg) -> Result<(f64, f64)> {
    if rf.onset() != sig.onset() {
        return Err(Error::Degenerate("onsets of RF and signal differ".into()));
    }
    sig.rotate_ne_rt()?;
    sig.trim2(cfg.signal_window.0, cfg.signal_window.1);

    let missing = |c: Component| Error::Degenerate(format!("missing component {c}"));
    let mut obs_z = sig.select(Component::Z).ok_or_else(|| missing(Component::Z))?.clone();
    let mut obs_r = sig.select(Component::R).ok_or_else(|| missing(Component::R))?.clone();
    let mut obs_rf_r = rf.select(Component::R).ok_or_else(|| missing(Component::R))?.clone();

    for tr in [&mut obs_z, &mut obs_r] {
        tr.detrend(Detrend::Simple).taper(0.05, Some(2.0));
        tr.bandpass(cfg.freqmin, cfg.freqmax, 4, true)?;
    }
    obs_rf_r.bandpass(cfg.freqmin, cfg.freqmax, 4, true)?;

    let sr = obs_z.stats.sampling_rate;
    let ind1 = (obs_r.onset_offset() * sr).ceil().max(0.0) as usize;
    let ind2 = ind1 + obs_z.npts();
    let conv = convolve_full(obs_z.data.view(), obs_rf_r.data.view());
    if ind2 > conv.len() {
        return Err(Error::LengthMismatch {
            left: ind2,
            right: conv.len(),
        });
    }
    let mut pred_r = obs_r.clone();
    pred_r.data = conv.slice(ndarray::s![ind1..ind2]).to_owned();

    let (w0, w1) = cfg.cc_window;
    obs_r.trim2(w0, w1);
    pred_r.trim2(w0, w1);

    let obs_sq = obs_r.data.mapv(|v| v * v);
    let pred_sq = pred_r.data.mapv(|v| v * v);
    let squared = corrcoef(obs_sq.view(), pred_sq.view())?;
    let raw = corrcoef(obs_r.data.view(), pred_r.data.view())?;
    Ok((squared, raw))
}

/// Maximum absolute and signed amplitude of a radial RF just around the
/// onset, recorded in `meta.max_abs_p` / `meta.max_p`.
pub fn max_p_onset(trace: &mut Trace) -> Result<(f64, f64)> {
    let mut copy = trace.clone();
    copy.trim2(DIRECT_P_TRIM.0, DIRECT_P_TRIM.1).taper(0.05, None);
    let w = copy.window(DIRECT_P_WINDOW.0, DIRECT_P_WINDOW.1);
    if w.is_empty() {
        return Err(Error::Degenerate("direct-P window is empty".into()));
    }
    let max_abs_p = max_abs(w);
    let max_p = w.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    trace.meta.max_abs_p = Some(max_abs_p);
    trace.meta.max_p = Some(max_p);
    Ok((max_abs_p, max_p))
}

/// Admission rule for the direct-P consistency check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectPCheck {
    /// Allowed difference between the windowed and the global maximum;
    /// 0.0 demands exact equality.
    pub tolerance: f64,
    pub ceiling: f64,
}

impl DirectPCheck {
    pub fn admits(&self, max_p: f64, global_max: f64) -> bool {
        (max_p - global_max).abs() <= self.tolerance && max_p < self.ceiling
    }
}

/// Tapers a radial RF in place, records its peak amplitudes and tells
/// whether `check` admits its direct P against the tapered trace's maximum.
pub fn check_direct_p(rf_r: &mut Trace, check: &DirectPCheck) -> Result<bool> {
    rf_r.taper(0.05, None);
    rf_r.meta.max_rf_r_abs = Some(rf_r.max_abs());
    let (_, max_p) = max_p_onset(rf_r)?;
    Ok(check.admits(max_p, rf_r.max()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::tests::trace;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn radial_rf(peaks: &[(usize, f64)]) -> Trace {
        let mut data = vec![0.0; 400];
        for &(i, a) in peaks {
            for (k, v) in data.iter_mut().enumerate() {
                let d = k as f64 - i as f64;
                *v += a * (-(d * d) / 2.0).exp();
            }
        }
        // onset at 10 s, 10 Hz
        trace(Component::R, 10.0, 10.0, data)
    }

    #[test]
    fn slope_ratio_high_for_clean_onset() {
        let mut tr = radial_rf(&[(102, 0.5)]);
        // low-level pre-onset ripple
        for (k, v) in tr.data.iter_mut().enumerate().take(95) {
            *v += 0.001 * (k as f64 * 1.3).sin();
        }
        assert!(slope_ratio(&tr) > 5.0);
    }

    #[test]
    fn slope_ratio_low_for_noise() {
        let data: Vec<f64> = (0..400).map(|k| (k as f64 * 1.7).sin()).collect();
        let tr = trace(Component::R, 10.0, 10.0, data);
        assert!(slope_ratio(&tr) < 5.0);
    }

    #[test]
    fn slope_ratio_silent_reference() {
        let mut data = vec![0.0; 400];
        data[100] = 0.2;
        data[101] = 0.5;
        data[102] = 0.2;
        let tr = trace(Component::R, 10.0, 10.0, data);
        assert_eq!(slope_ratio(&tr), 0.0);
    }

    #[test]
    fn max_p_window_and_annotation() {
        let mut tr = radial_rf(&[(105, 0.6), (130, 0.3)]);
        let (abs, max) = max_p_onset(&mut tr).unwrap();
        assert!(approx_eq(max, 0.6, 1e-3));
        assert!(approx_eq(abs, 0.6, 1e-3));
        assert_eq!(tr.meta.max_p, Some(max));
        assert_eq!(tr.meta.max_abs_p, Some(abs));
    }

    #[test]
    fn direct_p_admission() {
        let exact = DirectPCheck {
            tolerance: 0.0,
            ceiling: 1.0,
        };
        let mut good = radial_rf(&[(105, 0.6), (130, 0.3)]);
        let (_, max_p) = max_p_onset(&mut good).unwrap();
        assert!(exact.admits(max_p, good.max()));

        // later arrival dominates the trace
        let mut late = radial_rf(&[(105, 0.3), (180, 0.6)]);
        let (_, max_p) = max_p_onset(&mut late).unwrap();
        assert!(!exact.admits(max_p, late.max()));

        // above the ceiling
        let mut big = radial_rf(&[(105, 1.4)]);
        let (_, max_p) = max_p_onset(&mut big).unwrap();
        assert!(!exact.admits(max_p, big.max()));

        let loose = DirectPCheck {
            tolerance: 0.01,
            ceiling: 1.0,
        };
        assert!(loose.admits(0.595, 0.6));
        assert!(!exact.admits(0.595, 0.6));
    }

    #[test]
    fn edge_artifact_does_not_mask_direct_p() {
        // 100 s RF at 10 Hz, onset 25 s, direct P at onset + 0.5 s and a
        // larger deconvolution artifact on the last sample
        let mut data: Vec<f64> = (0..1000)
            .map(|k| {
                let d = k as f64 - 255.0;
                0.6 * (-(d * d) / 8.0).exp()
            })
            .collect();
        data[999] = 0.8;
        let mut rf = trace(Component::R, 10.0, 25.0, data);
        assert_eq!(rf.max(), 0.8);

        let exact = DirectPCheck {
            tolerance: 0.0,
            ceiling: 1.0,
        };
        assert!(check_direct_p(&mut rf, &exact).unwrap());
        assert_eq!(rf.data[999], 0.0);
        assert!(approx_eq(rf.meta.max_rf_r_abs.unwrap(), 0.6, 1e-12));
        assert_eq!(rf.meta.max_p, Some(rf.max()));
    }

    #[test]
    fn direct_p_rejected_when_later_arrival_dominates() {
        let mut rf = trace(
            Component::R,
            10.0,
            25.0,
            (0..1000)
                .map(|k| {
                    let (d0, d1) = (k as f64 - 255.0, k as f64 - 600.0);
                    0.4 * (-(d0 * d0) / 8.0).exp() + 0.7 * (-(d1 * d1) / 8.0).exp()
                })
                .collect(),
        );
        let exact = DirectPCheck {
            tolerance: 0.0,
            ceiling: 1.0,
        };
        assert!(!check_direct_p(&mut rf, &exact).unwrap());
    }

    fn zne_and_rf(onset: f64) -> (ThreeComponent, ThreeComponent) {
        let fs = 10.0;
        let n = 1200;
        let pulse = |at: f64, k: usize| {
            let t = k as f64 / fs - at;
            (-(t * t) / 2.0).exp() * (2.0 * std::f64::consts::PI * 0.4 * t).cos()
        };
        let z: Vec<f64> = (0..n).map(|k| pulse(onset, k)).collect();
        let r: Vec<f64> = (0..n)
            .map(|k| 0.4 * pulse(onset, k) + 0.3 * pulse(onset + 30.0, k))
            .collect();
        let mut sig = [
            trace(Component::Z, fs, onset, z),
            trace(Component::N, fs, onset, r.iter().map(|v| -v).collect()),
            trace(Component::E, fs, onset, vec![0.0; n]),
        ];
        sig.iter_mut().for_each(|t| t.stats.back_azimuth = 0.0);
        let sig = ThreeComponent::new(sig).unwrap();

        // RF over the (-25, 75) window: spikes at lag 0 and 30 s.
        let m = 1001;
        let spike = |lag: f64, k: usize| {
            let d = k as f64 - (25.0 + lag) * fs;
            (-(d * d) / 2.0).exp()
        };
        let rf_r: Vec<f64> = (0..m).map(|k| 0.4 * spike(0.0, k) + 0.3 * spike(30.0, k)).collect();
        let rf_z: Vec<f64> = (0..m).map(|k| spike(0.0, k)).collect();
        let mut rf = [
            trace(Component::Z, fs, onset, rf_z),
            trace(Component::R, fs, onset, rf_r),
            trace(Component::T, fs, onset, vec![0.0; m]),
        ];
        rf.iter_mut().for_each(|t| t.stats.starttime = onset - 25.0);
        (ThreeComponent::new(rf).unwrap(), sig)
    }

    #[test]
    fn cc_conv_high_for_consistent_rf() {
        let (rf, sig) = zne_and_rf(40.0);
        let out = calc_cc_conv(vec![rf], &[sig], &ValidationCfg::default());
        assert!(out.skipped.is_empty(), "{:?}", out.skipped);
        assert_eq!(out.cc.len(), 1);
        assert!(out.cc[0] > 0.9, "cc = {}", out.cc[0]);
        let cc_conv = out.rfs[0].select(Component::R).unwrap().meta.cc_conv.unwrap();
        assert!(cc_conv > 0.9, "cc_conv = {cc_conv}");
    }

    #[test]
    fn cc_conv_count_mismatch_is_noop() {
        let (rf, sig) = zne_and_rf(40.0);
        let (rf2, _) = zne_and_rf(90.0);
        let before = vec![rf.clone(), rf2.clone()];
        let out = calc_cc_conv(vec![rf, rf2], &[sig], &ValidationCfg::default());
        assert!(out.cc.is_empty());
        assert!(out.skipped.is_empty());
        assert_eq!(out.rfs, before);
    }

    #[test]
    fn cc_conv_skips_degenerate_triple() {
        let (rf, mut sig) = zne_and_rf(40.0);
        sig.for_each_mut(|t| t.data.fill(0.0));
        let out = calc_cc_conv(vec![rf], &[sig], &ValidationCfg::default());
        assert!(out.cc.is_empty());
        assert_eq!(out.skipped.len(), 1);
        assert!(out.rfs[0].select(Component::R).unwrap().meta.cc_conv.is_none());
    }
}
