//! Ps moveout correction to a reference slowness.
//!
//! A post-onset sample at delay `tau` is interpreted as a Ps conversion from
//! the depth whose delay at the reference slowness is `tau`; its value is
//! read from the trace at the delay that depth has for the trace's own
//! slowness.

use crate::{
    constants::{deg2km, IASP91_LAYERS},
    error::{Error, Result},
    trace::Trace,
};

use tracing::debug;

const DZ_KM: f64 = 0.1;
const MAX_DEPTH_KM: f64 = 300.0;

fn velocities_at(depth: f64) -> (f64, f64) {
    IASP91_LAYERS
        .iter()
        .rev()
        .find(|(top, _, _)| depth >= *top)
        .map(|&(_, vp, vs)| (vp, vs))
        .unwrap_or((IASP91_LAYERS[0].1, IASP91_LAYERS[0].2))
}

fn vertical_slowness(v: f64, p: f64) -> f64 {
    (1.0 / (v * v) - p * p).max(0.0).sqrt()
}

/// Cumulative Ps-minus-P delay on the depth grid for ray parameter
/// `p` (s/km).
pub fn ps_delay_curve(p: f64) -> Vec<f64> {
    let n = (MAX_DEPTH_KM / DZ_KM) as usize;
    let mut out = Vec::with_capacity(n + 1);
    out.push(0.0);
    let mut acc = 0.0;
    for i in 0..n {
        let (vp, vs) = velocities_at((i as f64 + 0.5) * DZ_KM);
        acc += DZ_KM * (vertical_slowness(vs, p) - vertical_slowness(vp, p));
        out.push(acc);
    }
    out
}

/// Linear interpolation on increasing `xp`, extrapolating from the end
/// segments.
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len();
    if n < 2 {
        return fp.first().copied().unwrap_or(0.0);
    }
    let i = match xp.binary_search_by(|v| v.total_cmp(&x)) {
        Ok(i) => return fp[i],
        Err(i) => i.clamp(1, n - 1),
    };
    let (x0, x1) = (xp[i - 1], xp[i]);
    if x1 == x0 {
        return fp[i];
    }
    fp[i - 1] + (x - x0) * (fp[i] - fp[i - 1]) / (x1 - x0)
}

/// Corrects `trace` in place to the reference slowness (s/deg). Samples
/// before the onset are untouched; reads past the trace end give zero.
pub fn moveout(trace: &mut Trace, reference_slowness: f64) -> Result<()> {
    if !(reference_slowness > 0.0) {
        return Err(Error::Config(format!(
            "reference slowness {reference_slowness} s/deg"
        )));
    }
    let slowness = trace.stats.slowness;
    if !(slowness > 0.0) {
        debug!(station = %trace.stats.station_id(), "no slowness, moveout skipped");
        return Ok(());
    }
    let onset = trace
        .onset_index()
        .ok_or_else(|| Error::Degenerate("onset outside trace".into()))?;

    let t_ref = ps_delay_curve(reference_slowness / deg2km::<f64>());
    let t_own = ps_delay_curve(slowness / deg2km::<f64>());

    let depth: Vec<f64> = (0..t_ref.len()).map(|k| k as f64 * DZ_KM).collect();
    let sr = trace.stats.sampling_rate;
    let onset_pos = trace.onset_offset() * sr;
    let original = trace.data.clone();
    let n = original.len();
    let last = n.saturating_sub(1) as f64;

    for i in (onset + 1)..n {
        let tau = i as f64 / sr - trace.onset_offset();
        let z = interp(tau, &t_ref, &depth);
        let pos = onset_pos + interp(z, &depth, &t_own) * sr;
        trace.data[i] = if pos < 0.0 || pos > last + 1e-6 {
            0.0
        } else {
            let pos = pos.min(last);
            let j = (pos.floor() as usize).min(n - 2);
            let frac = pos - j as f64;
            original[j] * (1.0 - frac) + original[j + 1] * frac
        };
    }
    Ok(())
}
