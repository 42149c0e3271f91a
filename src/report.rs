//! Numeric outputs of a run. Plots and maps are rendered elsewhere from
//! these files.

use std::{
    fs::{create_dir_all, File},
    path::Path,
};

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_npy::write_npy;
use serde::{Deserialize, Serialize};
use serde_yaml::to_writer;
use tracing::{info, warn};

use crate::{
    cfg::PipelineCfg,
    depth::BasementDepthTable,
    error::Result,
    pipeline::{RunOutput, StationReport},
    stack::StationStack,
    station::Inventory,
    trace::Trace,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub stacked: usize,
    pub skipped: usize,
    pub stations: Vec<StationReport>,
}

impl RunReport {
    pub fn new(output: &RunOutput) -> Self {
        let stacked = output.reports.iter().filter(|r| r.delay().is_some()).count();
        RunReport {
            stacked,
            skipped: output.reports.len() - stacked,
            stations: output.reports.clone(),
        }
    }
}

/// A station on the delay/depth map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub station: String,
    pub latitude: f64,
    pub longitude: f64,
    pub delay: f64,
    pub depth: f64,
    /// Delay rescaled to [0, 1] over the plotted stations.
    pub colour: f64,
}

pub fn map_points(depths: &BasementDepthTable) -> Vec<MapPoint> {
    let (lo, hi) = depths
        .entries()
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| {
            (lo.min(e.delay), hi.max(e.delay))
        });
    let span = hi - lo;
    depths
        .entries()
        .iter()
        .map(|e| MapPoint {
            station: e.station.clone(),
            latitude: e.latitude,
            longitude: e.longitude,
            delay: e.delay,
            depth: e.depth,
            colour: if span > 0.0 { (e.delay - lo) / span } else { 0.0 },
        })
        .collect()
}

/// Rows of equal-length traces; longer ones are cut to the shortest.
fn matrix<'a>(rows: impl Iterator<Item = ArrayView1<'a, f64>> + Clone) -> Option<Array2<f64>> {
    let n = rows.clone().map(|r| r.len()).min()?;
    let views: Vec<_> = rows.map(|r| r.slice_move(ndarray::s![..n])).collect();
    ndarray::stack(Axis(0), &views).ok()
}

fn write_stacks(dir: &Path, stacks: &[StationStack]) -> Result<()> {
    let Some(first) = stacks.first() else {
        return Ok(());
    };
    let Some(m) = matrix(stacks.iter().map(|s| s.stack.data.view())) else {
        return Ok(());
    };
    if stacks.iter().any(|s| s.stack.npts() != m.ncols()) {
        warn!("stacks differ in length, cut to {} samples", m.ncols());
    }
    let times: Array1<f64> = first
        .stack
        .times()
        .slice_move(ndarray::s![..m.ncols()])
        .mapv(|t| t - first.stack.onset_offset());
    write_npy(dir.join("stacks.npy"), &m)?;
    write_npy(dir.join("stack_times.npy"), &times)?;
    Ok(())
}

fn write_wiggles(dir: &Path, wiggles: &[(String, Vec<Trace>)]) -> Result<()> {
    let dir = dir.join("wiggles");
    create_dir_all(&dir)?;
    for (station, records) in wiggles {
        match matrix(records.iter().map(|t| t.data.view())) {
            Some(m) => write_npy(dir.join(format!("{station}_R.npy")), &m)?,
            None => warn!(station = %station, "no wiggle records"),
        }
    }
    Ok(())
}

/// Writes every output of `output` under `cfg.io.output_dir`. Depth and
/// map files need station coordinates.
pub fn write_outputs(
    output: &RunOutput,
    cfg: &PipelineCfg,
    inventory: Option<&Inventory>,
) -> Result<()> {
    let dir = &cfg.io.output_dir;
    create_dir_all(dir)?;

    output.delays.write(cfg.delay_path())?;
    info!(path = %cfg.delay_path().display(), stations = output.delays.len(), "delay table written");

    if let Some(inv) = inventory {
        let depths = BasementDepthTable::build(&output.delays, inv);
        depths.write(cfg.depth_path())?;
        to_writer(File::create(dir.join("delay_map.yaml"))?, &map_points(&depths))?;
    }

    write_stacks(dir, &output.stacks)?;
    write_wiggles(dir, &output.wiggles)?;
    to_writer(File::create(dir.join("run_report.yaml"))?, &RunReport::new(output))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        delay_table::DelayTable,
        station::StationInfo,
    };

    fn info(code: &str, lat: f64) -> StationInfo {
        StationInfo {
            network: "XX".into(),
            code: code.into(),
            latitude: lat,
            longitude: 140.0,
            elevation: 0.0,
        }
    }

    #[test]
    fn colours_span_unit_interval() {
        let delays: DelayTable = vec![
            ("XX.A".to_string(), 0.2),
            ("XX.B".to_string(), 1.2),
            ("XX.C".to_string(), 0.7),
        ]
        .into_iter()
        .collect();
        let inv = Inventory::new(vec![info("A", -30.0), info("B", -31.0), info("C", -32.0)]);
        let points = map_points(&BasementDepthTable::build(&delays, &inv));
        let colour = |s: &str| points.iter().find(|p| p.station == s).unwrap().colour;
        assert_eq!(colour("XX.A"), 0.0);
        assert_eq!(colour("XX.B"), 1.0);
        assert!((colour("XX.C") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_station_colour_is_zero() {
        let delays: DelayTable = vec![("XX.A".to_string(), 0.4)].into_iter().collect();
        let inv = Inventory::new(vec![info("A", -30.0)]);
        let points = map_points(&BasementDepthTable::build(&delays, &inv));
        assert_eq!(points[0].colour, 0.0);
    }

    #[test]
    fn matrix_cuts_to_shortest() {
        let a = Array1::from(vec![1.0, 2.0, 3.0]);
        let b = Array1::from(vec![4.0, 5.0]);
        let m = matrix([a.view(), b.view()].into_iter()).unwrap();
        assert_eq!(m.shape(), &[2, 2]);
        assert!(matrix(std::iter::empty()).is_none());
    }
}
