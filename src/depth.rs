//! Delay-to-depth calibration and the basement-depth table.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    constants::{DEPTH_BREAK_DELAY, DEPTH_DEEP_INTERCEPT, DEPTH_DEEP_SLOPE, DEPTH_SHALLOW_SLOPE},
    delay_table::DelayTable,
    error::Result,
    station::Inventory,
};

/// Basement depth in metres for a Tpsb delay in seconds. The two regimes
/// do not meet at the break.
pub fn basement_depth(delay: f64) -> f64 {
    if delay < DEPTH_BREAK_DELAY {
        DEPTH_SHALLOW_SLOPE * delay
    } else {
        DEPTH_DEEP_SLOPE * delay + DEPTH_DEEP_INTERCEPT
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthEntry {
    pub station: String,
    pub latitude: f64,
    pub longitude: f64,
    pub delay: f64,
    pub depth: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasementDepthTable {
    entries: Vec<DepthEntry>,
}

impl BasementDepthTable {
    /// Joins delays with station coordinates, in delay-table file order.
    /// Stations without coordinates are left out.
    pub fn build(delays: &DelayTable, inventory: &Inventory) -> Self {
        let entries = delays
            .sorted()
            .into_iter()
            .filter_map(|(station, delay)| match inventory.get(station) {
                Some(info) => Some(DepthEntry {
                    station: station.to_string(),
                    latitude: info.latitude,
                    longitude: info.longitude,
                    delay,
                    depth: basement_depth(delay),
                }),
                None => {
                    warn!(station, "no coordinates, left out of depth table");
                    None
                }
            })
            .collect();
        BasementDepthTable { entries }
    }

    pub fn entries(&self) -> &[DepthEntry] {
        &self.entries
    }

    pub fn get(&self, station: &str) -> Option<&DepthEntry> {
        self.entries.iter().find(|e| e.station == station)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `"{lat} {lon} {delay_2dp} {depth} {station}"` per line.
    pub fn to_writer<W: Write>(&self, mut w: W) -> Result<()> {
        for e in &self.entries {
            writeln!(
                w,
                "{} {} {} {} {}",
                e.latitude,
                e.longitude,
                round2(e.delay),
                e.depth,
                e.station
            )?;
        }
        Ok(())
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.to_writer(&mut w)?;
        w.flush()?;
        Ok(())
    }
}
