use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{from_reader, to_writer};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub network: String,
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: f64,
}

impl StationInfo {
    /// `NET.STA`
    pub fn id(&self) -> String {
        format!("{}.{}", self.network, self.code)
    }

    /// Matches either the bare station code or the `NET.STA` id.
    pub fn matches(&self, station: &str) -> bool {
        match station.split_once('.') {
            Some((net, sta)) => net == self.network && sta == self.code,
            None => station == self.code,
        }
    }
}

/// Station coordinates, stored as a YAML list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    stations: Vec<StationInfo>,
}

impl Inventory {
    pub fn new(stations: Vec<StationInfo>) -> Self {
        Inventory { stations }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(from_reader(std::fs::File::open(path)?)?)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        to_writer(std::fs::File::create(path)?, self)?;
        Ok(())
    }

    pub fn get(&self, station: &str) -> Option<&StationInfo> {
        self.stations.iter().find(|s| s.matches(station))
    }

    pub fn ids(&self) -> Vec<String> {
        self.stations.iter().map(StationInfo::id).collect()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
