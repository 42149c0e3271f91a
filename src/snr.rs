//! Signal-to-noise screening of vertical components.

use tracing::debug;

use crate::{
    constants::{SCREEN_BAND, SNR_NOISE_WINDOW, SNR_SIGNAL_WINDOW},
    trace::{Detrend, Trace},
    utils::max_abs,
};

/// Peak amplitude after the onset over peak amplitude of the pre-event
/// noise, measured on a filtered private copy.
///
/// Returns 0.0 when either window is empty or the noise is silent; any
/// preprocessing failure also yields 0.0 so the trace is screened out.
pub fn signoise(trace: &Trace) -> f64 {
    let mut copy = trace.clone();
    copy.detrend(Detrend::Simple).taper(0.05, None);
    if let Err(err) = copy.bandpass(SCREEN_BAND.0, SCREEN_BAND.1, 4, false) {
        debug!(%err, station = %trace.stats.station_id(), "SNR preprocessing failed");
        return 0.0;
    }

    let sig = copy.window(SNR_SIGNAL_WINDOW.0, SNR_SIGNAL_WINDOW.1);
    let noise = copy.window(SNR_NOISE_WINDOW.0, SNR_NOISE_WINDOW.1);
    if sig.is_empty() || noise.is_empty() {
        return 0.0;
    }
    let noise_max = max_abs(noise);
    if noise_max == 0.0 || !noise_max.is_finite() {
        return 0.0;
    }
    let ratio = max_abs(sig) / noise_max;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Admission rule: SNR at or above the threshold.
pub fn passes_snr(snr: f64, snr_min: f64) -> bool {
    snr >= snr_min
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{tests::trace, Component};
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn event(noise_amp: f64, signal_amp: f64) -> Trace {
        let fs = 10.0;
        let onset = 60.0;
        let data: Vec<f64> = (0..1500)
            .map(|i| {
                let t = i as f64 / fs;
                let noise = noise_amp * (2.0 * PI * 0.37 * t).sin();
                let dt = t - onset;
                let pulse = if dt > 0.0 {
                    signal_amp * (2.0 * PI * 0.5 * dt).sin() * (-dt / 4.0).exp()
                } else {
                    0.0
                };
                noise + pulse
            })
            .collect();
        trace(Component::Z, fs, onset, data)
    }

    #[test]
    fn strong_arrival_passes() {
        let snr = signoise(&event(0.05, 1.0));
        assert!(snr > 1.5, "snr = {snr}");
        assert!(passes_snr(snr, 1.5));
    }

    #[test]
    fn noise_only_fails() {
        let snr = signoise(&event(1.0, 0.0));
        assert!(snr < 1.5, "snr = {snr}");
    }

    #[test]
    fn silent_noise_window_gives_zero() {
        let tr = trace(Component::Z, 10.0, 60.0, vec![0.0; 1500]);
        assert_eq!(signoise(&tr), 0.0);
    }

    #[test]
    fn short_trace_gives_zero() {
        // noise window lies before the trace start
        let tr = trace(Component::Z, 10.0, 5.0, vec![1.0; 300]);
        assert_eq!(signoise(&tr), 0.0);
    }

    #[test]
    fn input_untouched() {
        let tr = event(0.1, 1.0);
        let before = tr.clone();
        let _ = signoise(&tr);
        assert_eq!(tr, before);
    }

    proptest! {
        #[test]
        fn snr_is_non_negative_and_finite(
            samples in proptest::collection::vec(-1.0e3f64..1.0e3, 1200..1300)
        ) {
            let tr = trace(Component::Z, 10.0, 60.0, samples);
            let snr = signoise(&tr);
            prop_assert!(snr >= 0.0);
            prop_assert!(snr.is_finite());
        }
    }
}
