//! On-disk waveform archive.
//!
//! ```text
//! <root>/<NET.STA>/index.yaml     trace headers, one entry per file
//! <root>/<NET.STA>/00000_Z.npy    samples
//! <root>/<NET.STA>/.complete      written last
//! ```
//!
//! A station directory without `.complete` is an interrupted write and is
//! never read as data.

use std::{
    fs::{create_dir_all, read_dir, remove_file, File},
    path::{Path, PathBuf},
};

use ndarray::Array1;
use ndarray_npy::{read_npy, write_npy};
use serde::{Deserialize, Serialize};
use serde_yaml::{from_reader, to_writer};
use tracing::debug;

use crate::{
    error::{Error, Result},
    trace::{Stats, Trace},
};

pub const INDEX_FILE: &str = "index.yaml";
pub const COMPLETE_MARKER: &str = ".complete";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    stats: Stats,
}

pub fn station_dir(root: &Path, station: &str) -> PathBuf {
    root.join(station)
}

pub fn is_complete(dir: &Path) -> bool {
    dir.join(COMPLETE_MARKER).is_file()
}

/// Writes all traces of one station, replacing any previous content of
/// the index. The marker goes down only after every file is written.
pub fn write_station(root: &Path, station: &str, traces: &[Trace]) -> Result<PathBuf> {
    let dir = station_dir(root, station);
    create_dir_all(&dir)?;
    let marker = dir.join(COMPLETE_MARKER);
    if marker.exists() {
        remove_file(&marker)?;
    }

    let mut index = Vec::with_capacity(traces.len());
    for (i, tr) in traces.iter().enumerate() {
        let file = format!("{i:05}_{}.npy", tr.component());
        write_npy(dir.join(&file), &tr.data)?;
        index.push(IndexEntry {
            file,
            stats: tr.stats.clone(),
        });
    }
    to_writer(File::create(dir.join(INDEX_FILE))?, &index)?;
    File::create(&marker)?;
    debug!(station, traces = traces.len(), dir = %dir.display(), "archived");
    Ok(dir)
}

pub fn read_station(root: &Path, station: &str) -> Result<Vec<Trace>> {
    let dir = station_dir(root, station);
    if !dir.is_dir() {
        return Err(Error::NoData {
            station: station.to_string(),
        });
    }
    if !is_complete(&dir) {
        return Err(Error::IncompleteCache { path: dir });
    }
    let index: Vec<IndexEntry> = from_reader(File::open(dir.join(INDEX_FILE))?)?;
    index
        .into_iter()
        .map(|e| {
            let data: Array1<f64> = read_npy(dir.join(&e.file))?;
            Ok(Trace::new(e.stats, data))
        })
        .collect()
}

/// Station ids with a complete directory under `root`, sorted.
pub fn list_stations(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in read_dir(root)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if !is_complete(&path) {
            debug!(dir = %path.display(), "skipping incomplete station directory");
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            out.push(name.to_string());
        }
    }
    out.sort();
    Ok(out)
}
