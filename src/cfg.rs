use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::from_reader;

use crate::{
    decon::DeconMethod,
    error::{Error, Result},
    stack::{PickStrategy, StackMethod},
};

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IoCfg {
    pub archive_dir: PathBuf,
    pub output_dir: PathBuf,
    pub inventory_file: Option<PathBuf>,
    pub delay_file: String,
    pub depth_file: String,
}

impl Default for IoCfg {
    fn default() -> Self {
        IoCfg {
            archive_dir: PathBuf::from("rf_data"),
            output_dir: PathBuf::from("output"),
            inventory_file: None,
            delay_file: "delays.txt".into(),
            depth_file: "basement_depth.txt".into(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SelectionCfg {
    /// Network codes; empty selects all.
    pub networks: Vec<String>,
    /// Station codes or `NET.STA` ids; empty selects all.
    pub stations: Vec<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    /// Epicentral distance range in degrees.
    pub distance_range: (f64, f64),
    pub magnitude_range: (f64, f64),
}

impl Default for SelectionCfg {
    fn default() -> Self {
        SelectionCfg {
            networks: vec![],
            stations: vec![],
            start_time: None,
            end_time: None,
            distance_range: (30.0, 95.0),
            magnitude_range: (5.5, 10.0),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PreprocessCfg {
    pub resample_hz: Option<f64>,
    pub freqmin: f64,
    pub freqmax: f64,
    pub corners: usize,
    pub taper_percentage: f64,
    /// Receiver-function window relative to onset, seconds.
    pub rf_window: (f64, f64),
}

impl Default for PreprocessCfg {
    fn default() -> Self {
        PreprocessCfg {
            resample_hz: None,
            freqmin: 0.1,
            freqmax: 1.0,
            corners: 4,
            taper_percentage: 0.05,
            rf_window: (-25.0, 75.0),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RfCfg {
    pub method: DeconMethod,
    pub spiking: f64,
    pub water_level: f64,
    /// Gaussian width in rad/s for the frequency-domain method.
    pub gauss: f64,
    pub moveout: bool,
    /// s/deg
    pub reference_slowness: f64,
}

impl Default for RfCfg {
    fn default() -> Self {
        RfCfg {
            method: DeconMethod::Time,
            spiking: 1.0,
            water_level: 0.01,
            gauss: 2.5,
            moveout: true,
            reference_slowness: 6.4,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct QualityCfg {
    pub snr_min: f64,
    pub slope_ratio_min: f64,
    pub require_direct_p: bool,
    /// 0.0 reproduces the exact-equality comparison.
    pub direct_p_tolerance: f64,
    pub max_p_ceiling: f64,
    pub cc_conv_min: Option<f64>,
    pub qc_window: (f64, f64),
}

impl Default for QualityCfg {
    fn default() -> Self {
        QualityCfg {
            snr_min: 1.5,
            slope_ratio_min: 5.0,
            require_direct_p: true,
            direct_p_tolerance: 0.0,
            max_p_ceiling: 1.0,
            cc_conv_min: None,
            qc_window: (-5.0, 10.0),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationCfg {
    /// Signal window kept around the onset before reconvolution.
    pub signal_window: (f64, f64),
    /// Correlation window relative to onset.
    pub cc_window: (f64, f64),
    pub freqmin: f64,
    pub freqmax: f64,
}

impl Default for ValidationCfg {
    fn default() -> Self {
        ValidationCfg {
            signal_window: (-25.0, 75.0),
            cc_window: (20.0, 45.0),
            freqmin: 0.1,
            freqmax: 1.0,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StackCfg {
    pub method: StackMethod,
    pub picker: PickStrategy,
    pub twtt: bool,
    pub wiggle_window: (f64, f64),
}

impl Default for StackCfg {
    fn default() -> Self {
        StackCfg {
            method: StackMethod::Linear,
            picker: PickStrategy::GlobalMax,
            twtt: false,
            wiggle_window: (-2.5, 25.0),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineCfg {
    pub io: IoCfg,
    pub selection: SelectionCfg,
    pub preprocess: PreprocessCfg,
    pub rf: RfCfg,
    pub quality: QualityCfg,
    pub validation: ValidationCfg,
    pub stack: StackCfg,
    pub parallel: bool,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        PipelineCfg {
            io: IoCfg::default(),
            selection: SelectionCfg::default(),
            preprocess: PreprocessCfg::default(),
            rf: RfCfg::default(),
            quality: QualityCfg::default(),
            validation: ValidationCfg::default(),
            stack: StackCfg::default(),
            parallel: true,
        }
    }
}

fn ordered(name: &str, (a, b): (f64, f64)) -> Result<()> {
    if a < b {
        Ok(())
    } else {
        Err(Error::Config(format!("{name}: {a} is not below {b}")))
    }
}

impl PipelineCfg {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let cfg: PipelineCfg = from_reader(std::fs::File::open(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ordered("selection.distance_range", self.selection.distance_range)?;
        ordered("selection.magnitude_range", self.selection.magnitude_range)?;
        if let (Some(t0), Some(t1)) = (self.selection.start_time, self.selection.end_time) {
            ordered("selection time range", (t0, t1))?;
        }
        ordered("preprocess band", (self.preprocess.freqmin, self.preprocess.freqmax))?;
        if self.preprocess.freqmin <= 0.0 {
            return Err(Error::Config("preprocess.freqmin must be positive".into()));
        }
        if let Some(rate) = self.preprocess.resample_hz {
            if rate <= 2.0 * self.preprocess.freqmax {
                return Err(Error::Config(format!(
                    "resample rate {rate} Hz cannot carry {} Hz",
                    self.preprocess.freqmax
                )));
            }
        }
        if !(0.0..=0.5).contains(&self.preprocess.taper_percentage) {
            return Err(Error::Config("taper_percentage must lie in [0, 0.5]".into()));
        }
        ordered("preprocess.rf_window", self.preprocess.rf_window)?;
        ordered("quality.qc_window", self.quality.qc_window)?;
        ordered("validation.signal_window", self.validation.signal_window)?;
        ordered("validation.cc_window", self.validation.cc_window)?;
        ordered("validation band", (self.validation.freqmin, self.validation.freqmax))?;
        ordered("stack.wiggle_window", self.stack.wiggle_window)?;
        if self.quality.direct_p_tolerance < 0.0 {
            return Err(Error::Config("direct_p_tolerance must be non-negative".into()));
        }
        if self.rf.reference_slowness <= 0.0 {
            return Err(Error::Config("rf.reference_slowness must be positive".into()));
        }
        Ok(())
    }

    pub fn delay_path(&self) -> PathBuf {
        self.io.output_dir.join(&self.io.delay_file)
    }

    pub fn depth_path(&self) -> PathBuf {
        self.io.output_dir.join(&self.io.depth_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineCfg::default().validate().unwrap();
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "
io:
  archive_dir: /data/rf
quality:
  snr_min: 2.0
  direct_p_tolerance: 0.001
rf:
  method: freq
stack:
  picker: first_local_max
";
        let cfg: PipelineCfg = serde_yaml::from_str(yaml).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.io.archive_dir, PathBuf::from("/data/rf"));
        assert_eq!(cfg.io.delay_file, "delays.txt");
        assert_eq!(cfg.quality.snr_min, 2.0);
        assert_eq!(cfg.quality.slope_ratio_min, 5.0);
        assert_eq!(cfg.rf.method, DeconMethod::Freq);
        assert_eq!(cfg.stack.picker, PickStrategy::FirstLocalMax);
        assert!(cfg.parallel);
    }

    #[test]
    fn inverted_ranges_rejected() {
        let mut cfg = PipelineCfg::default();
        cfg.selection.distance_range = (95.0, 30.0);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        let mut cfg = PipelineCfg::default();
        cfg.preprocess.resample_hz = Some(1.5);
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineCfg::default();
        cfg.quality.direct_p_tolerance = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn shipped_config_parses() {
        let cfg: PipelineCfg = serde_yaml::from_str(include_str!("../cfg/sedthick.yaml")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.preprocess.resample_hz, Some(10.0));
        assert_eq!(cfg.io.inventory_file, Some(PathBuf::from("stations.yaml")));
        assert_eq!(cfg.selection.networks, vec!["AU".to_string(), "S1".to_string()]);
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = PipelineCfg::default();
        let text = serde_yaml::to_string(&cfg).unwrap();
        let back: PipelineCfg = serde_yaml::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }
}
