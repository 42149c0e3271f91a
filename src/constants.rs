use num::traits::Float;

/// Kilometres per degree of great-circle arc on a 6371 km sphere.
pub fn deg2km<T: Float>() -> T {
    T::from(111.194_926_644_558_73).unwrap()
}

/// SNR windows relative to onset, in seconds.
pub const SNR_SIGNAL_WINDOW: (f64, f64) = (-5.0, 25.0);
pub const SNR_NOISE_WINDOW: (f64, f64) = (-45.0, -15.0);

/// Band used for SNR screening and reconvolution checks, in Hz.
pub const SCREEN_BAND: (f64, f64) = (0.1, 1.0);

/// Direct-P consistency windows relative to onset, in seconds.
pub const DIRECT_P_TRIM: (f64, f64) = (-5.0, 30.0);
pub const DIRECT_P_WINDOW: (f64, f64) = (-0.1, 1.5);

/// Slope-ratio windows relative to onset, in seconds.
pub const SLOPE_P_WINDOW: (f64, f64) = (-0.5, 0.5);
pub const SLOPE_REF_WINDOW: (f64, f64) = (-5.0, -0.5);

/// Two-regime delay-to-depth calibration (metres from seconds).
pub const DEPTH_BREAK_DELAY: f64 = 0.58;
pub const DEPTH_SHALLOW_SLOPE: f64 = 366.0;
pub const DEPTH_DEEP_SLOPE: f64 = 3206.9;
pub const DEPTH_DEEP_INTERCEPT: f64 = -1661.2;

/// Simplified iasp91 layering used for moveout: (top depth km, vp, vs).
pub const IASP91_LAYERS: [(f64, f64, f64); 5] = [
    (0.0, 5.80, 3.36),
    (20.0, 6.50, 3.75),
    (35.0, 8.04, 4.47),
    (120.0, 8.05, 4.50),
    (210.0, 8.30, 4.52),
];
