//! Two-way travel time from the autocorrelation of a radial stack.

use ndarray::{s, ArrayView1};

use crate::{
    error::{Error, Result},
    trace::Trace,
    utils::{convolve_full, local_minima},
};

/// Causal half of the autocorrelation, normalised to 1 at lag 0. The
/// result starts at t = 0, which is also its onset.
pub fn autocorrelate(trace: &Trace) -> Result<Trace> {
    let n = trace.npts();
    if n == 0 {
        return Err(Error::Degenerate("empty trace".into()));
    }
    let reversed: ArrayView1<f64> = trace.data.slice(s![..;-1]);
    let full = convolve_full(trace.data.view(), reversed);
    let mut causal = full.slice(s![n - 1..]).to_owned();
    let zero = causal[0];
    if !(zero > 0.0) {
        return Err(Error::Degenerate("trace has no energy".into()));
    }
    causal.mapv_inplace(|v| v / zero);

    let mut out = Trace::new(trace.stats.clone(), causal);
    out.stats.starttime = 0.0;
    out.stats.onset = 0.0;
    Ok(out)
}

/// Time of the first local minimum after t = 0.
pub fn twtt(acf: &Trace) -> Result<f64> {
    let zero = acf.onset_index().unwrap_or(0);
    let i = local_minima(acf.data.view())
        .into_iter()
        .find(|&i| i > zero)
        .ok_or_else(|| Error::NoExtremum("autocorrelation has no minimum".into()))?;
    Ok(acf.times()[i] - acf.onset_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{tests::trace, Component};

    #[test]
    fn autocorrelation_is_normalised_and_causal() {
        let tr = trace(Component::R, 10.0, 5.0, vec![0.0, 1.0, 2.0, 1.0, 0.0]);
        let acf = autocorrelate(&tr).unwrap();
        assert_eq!(acf.npts(), 5);
        assert!((acf.data[0] - 1.0).abs() < 1e-12);
        // lag 1: (1*2 + 2*1) / 6
        assert!((acf.data[1] - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(acf.onset_index(), Some(0));
    }

    #[test]
    fn reverberation_gives_minimum() {
        // pulse followed by a negative reverberation 0.4 s later
        let mut data = vec![0.0; 100];
        data[20] = 1.0;
        data[24] = -0.6;
        let acf = autocorrelate(&trace(Component::R, 10.0, 2.0, data)).unwrap();
        let t = twtt(&acf).unwrap();
        assert!((t - 0.4).abs() < 1e-9, "twtt {t}");
    }

    #[test]
    fn missing_minimum_is_an_error() {
        let acf = trace(Component::R, 10.0, 0.0, (0..20).map(|i| 1.0 - i as f64 * 0.01).collect());
        assert!(matches!(twtt(&acf), Err(Error::NoExtremum(_))));
        let flat = trace(Component::R, 10.0, 0.0, vec![0.0; 10]);
        assert!(autocorrelate(&flat).is_err());
    }
}
