//! Station -> Tpsb delay table and its flat text file.
//!
//! One line per station, `"{station:<8}\t{delay:.2}"`, written sorted by
//! delay, largest first. The file keeps two decimals only.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelayTable {
    entries: Vec<(String, f64)>,
}

impl DelayTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the delay of `station`.
    pub fn insert(&mut self, station: impl Into<String>, delay: f64) {
        let station = station.into();
        match self.entries.iter_mut().find(|(s, _)| *s == station) {
            Some(entry) => entry.1 = delay,
            None => self.entries.push((station, delay)),
        }
    }

    pub fn get(&self, station: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(s, _)| s == station)
            .map(|&(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(s, d)| (s.as_str(), *d))
    }

    /// Entries by delay, largest first; ties keep insertion order.
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut v: Vec<_> = self.iter().collect();
        v.sort_by(|a, b| b.1.total_cmp(&a.1));
        v
    }

    pub fn to_writer<W: Write>(&self, mut w: W) -> Result<()> {
        for (station, delay) in self.sorted() {
            writeln!(w, "{station:<8}\t{delay:.2}")?;
        }
        Ok(())
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.to_writer(&mut w)?;
        w.flush()?;
        Ok(())
    }

    pub fn from_reader<R: BufRead>(r: R) -> Result<Self> {
        let mut table = DelayTable::new();
        for (i, line) in r.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [station, delay] = fields[..] else {
                return Err(Error::Parse {
                    line: i + 1,
                    reason: format!("expected station and delay, got {line:?}"),
                });
            };
            let delay: f64 = delay.parse().map_err(|_| Error::Parse {
                line: i + 1,
                reason: format!("bad delay {delay:?}"),
            })?;
            table.insert(station, delay);
        }
        Ok(table)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

impl FromIterator<(String, f64)> for DelayTable {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut table = DelayTable::new();
        iter.into_iter().for_each(|(s, d)| table.insert(s, d));
        table
    }
}
