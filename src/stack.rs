//! Station grouping, stacking and Tpsb picking.

use std::collections::HashMap;

use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Error, Result},
    trace::{Component, Trace},
    utils::{argmax, local_maxima, max_abs},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackMethod {
    /// Plain element-wise mean.
    Linear,
    /// Mean of traces each scaled to unit peak amplitude.
    AmplitudeWeighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStrategy {
    /// Time of the largest sample of the stack.
    GlobalMax,
    /// First local maximum after the onset sample.
    FirstLocalMax,
}

/// Keeps radial records whose slope ratio exceeds `slope_ratio_min`,
/// ordered by back azimuth, tapered and cut to `window` around the onset.
pub fn quality_control(
    records: Vec<Trace>,
    slope_ratio_min: f64,
    taper_percentage: f64,
    window: (f64, f64),
) -> Vec<Trace> {
    let mut kept: Vec<Trace> = records
        .into_iter()
        .filter(|t| t.component() == Component::R)
        .filter(|t| t.meta.slope_ratio.map_or(false, |s| s > slope_ratio_min))
        .collect();
    kept.sort_by(|a, b| a.stats.back_azimuth.total_cmp(&b.stats.back_azimuth));
    for t in kept.iter_mut() {
        t.taper(taper_percentage, None).trim2(window.0, window.1);
    }
    kept
}

/// Station id -> records, iterated in first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct StationGroups {
    order: Vec<String>,
    records: HashMap<String, Vec<Trace>>,
}

impl StationGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trace: Trace) {
        let id = trace.stats.station_id();
        match self.records.get_mut(&id) {
            Some(v) => v.push(trace),
            None => {
                self.order.push(id.clone());
                self.records.insert(id, vec![trace]);
            }
        }
    }

    pub fn get(&self, station: &str) -> Option<&[Trace]> {
        self.records.get(station).map(Vec::as_slice)
    }

    /// Removes a station and returns its records.
    pub fn take(&mut self, station: &str) -> Option<Vec<Trace>> {
        let records = self.records.remove(station)?;
        self.order.retain(|id| id != station);
        Some(records)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Trace])> {
        self.order
            .iter()
            .map(move |id| (id.as_str(), self.records[id].as_slice()))
    }
}

impl FromIterator<Trace> for StationGroups {
    fn from_iter<I: IntoIterator<Item = Trace>>(iter: I) -> Self {
        let mut groups = StationGroups::new();
        iter.into_iter().for_each(|t| groups.push(t));
        groups
    }
}

/// Element-wise stack of one station's records. The stack takes its
/// headers from the first record.
pub fn stack(station: &str, records: &[Trace], method: StackMethod) -> Result<Trace> {
    let first = records
        .first()
        .ok_or_else(|| Error::Degenerate(format!("no records to stack for {station}")))?;

    let scaled: Vec<Array1<f64>> = match method {
        StackMethod::Linear => records.iter().map(|t| t.data.clone()).collect(),
        StackMethod::AmplitudeWeighted => records
            .iter()
            .filter_map(|t| {
                let peak = max_abs(t.data.view());
                (peak > 0.0).then(|| t.data.mapv(|v| v / peak))
            })
            .collect(),
    };
    if scaled.is_empty() {
        return Err(Error::Degenerate(format!("all records of {station} are flat")));
    }
    let views: Vec<ArrayView1<f64>> = scaled.iter().map(|a| a.view()).collect();
    let matrix = ndarray::stack(Axis(0), &views).map_err(|_| Error::RaggedStack {
        station: station.to_string(),
    })?;
    let data = matrix.mean_axis(Axis(0)).ok_or_else(|| Error::RaggedStack {
        station: station.to_string(),
    })?;

    let mut out = Trace::new(first.stats.clone(), data);
    out.stats.component = Component::R;
    Ok(out)
}

/// Delay of the stack's global maximum after the onset.
pub fn global_max_delay(stack: &Trace) -> Result<f64> {
    let i = argmax(stack.data.view())
        .ok_or_else(|| Error::NoExtremum("empty stack".into()))?;
    Ok(stack.times()[i] - stack.onset_offset())
}

/// Delay of the first local maximum strictly after the onset sample.
pub fn get_tpsb(stack: &Trace) -> Result<f64> {
    let onset = stack
        .onset_index()
        .ok_or_else(|| Error::NoExtremum("onset outside stack".into()))?;
    let i = local_maxima(stack.data.view())
        .into_iter()
        .find(|&i| i > onset)
        .ok_or_else(|| {
            Error::NoExtremum(format!(
                "no peak after onset in stack of {}",
                stack.stats.station_id()
            ))
        })?;
    Ok(stack.times()[i] - stack.onset_offset())
}

pub fn pick_delay(stack: &Trace, strategy: PickStrategy) -> Result<f64> {
    match strategy {
        PickStrategy::GlobalMax => global_max_delay(stack),
        PickStrategy::FirstLocalMax => get_tpsb(stack),
    }
}

/// One station's stacked radial RF and the records behind it.
#[derive(Debug, Clone)]
pub struct StationStack {
    pub station: String,
    /// `meta.delay` holds the picked Tpsb.
    pub stack: Trace,
    pub records: Vec<Trace>,
}

impl StationStack {
    pub fn delay(&self) -> f64 {
        self.stack.meta.delay.unwrap_or(f64::NAN)
    }
}

pub fn stack_and_pick(
    station: &str,
    records: &[Trace],
    method: StackMethod,
    strategy: PickStrategy,
) -> Result<StationStack> {
    let mut s = stack(station, records, method)?;
    let delay = pick_delay(&s, strategy)?;
    debug!(station, delay, records = records.len(), "picked delay");
    s.meta.delay = Some(delay);
    Ok(StationStack {
        station: station.to_string(),
        stack: s,
        records: records.to_vec(),
    })
}
