//! Three-component groups of traces sharing an event/station pair.

use ndarray::Array1;
use tracing::debug;

use crate::{
    error::{Error, Result},
    trace::{Component, Detrend, Trace},
};

/// Exactly three traces, one per component.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreeComponent {
    traces: [Trace; 3],
}

impl ThreeComponent {
    /// Builds a group; fails unless the three components are distinct and
    /// share station and onset.
    pub fn new(traces: [Trace; 3]) -> Result<Self> {
        let [a, b, c] = &traces;
        let comps = [a.component(), b.component(), c.component()];
        if comps[0] == comps[1] || comps[0] == comps[2] || comps[1] == comps[2] {
            return Err(Error::Degenerate(format!(
                "duplicate components in group {comps:?}"
            )));
        }
        if a.stats.station_id() != b.stats.station_id()
            || a.stats.station_id() != c.stats.station_id()
            || a.stats.onset != b.stats.onset
            || a.stats.onset != c.stats.onset
        {
            return Err(Error::Degenerate(
                "group mixes stations or events".into(),
            ));
        }
        Ok(ThreeComponent { traces })
    }

    pub fn select(&self, component: Component) -> Option<&Trace> {
        self.traces.iter().find(|t| t.component() == component)
    }

    pub fn select_mut(&mut self, component: Component) -> Option<&mut Trace> {
        self.traces.iter_mut().find(|t| t.component() == component)
    }

    pub fn into_traces(self) -> [Trace; 3] {
        self.traces
    }

    pub fn onset(&self) -> f64 {
        self.traces[0].stats.onset
    }

    pub fn back_azimuth(&self) -> f64 {
        self.traces[0].stats.back_azimuth
    }

    pub fn for_each_mut(&mut self, f: impl FnMut(&mut Trace)) -> &mut Self {
        self.traces.iter_mut().for_each(f);
        self
    }

    pub fn detrend(&mut self, kind: Detrend) -> &mut Self {
        self.for_each_mut(|t| {
            t.detrend(kind);
        })
    }

    pub fn taper(&mut self, max_percentage: f64, max_length: Option<f64>) -> &mut Self {
        self.for_each_mut(|t| {
            t.taper(max_percentage, max_length);
        })
    }

    pub fn bandpass(
        &mut self,
        freqmin: f64,
        freqmax: f64,
        corners: usize,
        zerophase: bool,
    ) -> Result<&mut Self> {
        for t in self.traces.iter_mut() {
            t.bandpass(freqmin, freqmax, corners, zerophase)?;
        }
        Ok(self)
    }

    pub fn trim2(&mut self, rel0: f64, rel1: f64) -> &mut Self {
        self.for_each_mut(|t| {
            t.trim2(rel0, rel1);
        })
    }

    /// True when all components have the same non-zero length.
    pub fn is_aligned(&self) -> bool {
        let n = self.traces[0].npts();
        n > 0 && self.traces.iter().all(|t| t.npts() == n)
    }

    /// NE -> RT rotation using the back azimuth; Z is untouched.
    pub fn rotate_ne_rt(&mut self) -> Result<&mut Self> {
        let rotated = match (self.select(Component::N), self.select(Component::E)) {
            (Some(n), Some(e)) => {
                if n.npts() != e.npts() {
                    return Err(Error::LengthMismatch {
                        left: n.npts(),
                        right: e.npts(),
                    });
                }
                let (sb, cb) = self.back_azimuth().to_radians().sin_cos();
                let r: Array1<f64> = n
                    .data
                    .iter()
                    .zip(e.data.iter())
                    .map(|(&nv, &ev)| -ev * sb - nv * cb)
                    .collect();
                let t: Array1<f64> = n
                    .data
                    .iter()
                    .zip(e.data.iter())
                    .map(|(&nv, &ev)| -ev * cb + nv * sb)
                    .collect();
                Some((r, t))
            }
            _ => None,
        };
        let Some((r, t)) = rotated else {
            return Ok(self);
        };

        for tr in self.traces.iter_mut() {
            match tr.stats.component {
                Component::N => {
                    tr.stats.component = Component::R;
                    tr.data = r.clone();
                }
                Component::E => {
                    tr.stats.component = Component::T;
                    tr.data = t.clone();
                }
                _ => {}
            }
        }
        Ok(self)
    }
}

/// Groups a flat trace list into three-component groups keyed by
/// (station, onset), in first-seen order. Returns the groups and the
/// number of traces left over in incomplete groups.
pub fn group_by_onset(traces: Vec<Trace>) -> (Vec<ThreeComponent>, usize) {
    let mut keys: Vec<(String, f64)> = Vec::new();
    let mut buckets: Vec<Vec<Trace>> = Vec::new();
    for tr in traces {
        let key = (tr.stats.station_id(), tr.stats.onset);
        match keys.iter().position(|k| *k == key) {
            Some(i) => buckets[i].push(tr),
            None => {
                keys.push(key);
                buckets.push(vec![tr]);
            }
        }
    }

    let mut dropped = 0;
    let mut groups = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let n = bucket.len();
        let group = <[Trace; 3]>::try_from(bucket)
            .ok()
            .and_then(|arr| ThreeComponent::new(arr).ok());
        match group {
            Some(g) => groups.push(g),
            None => {
                debug!(traces = n, "dropping incomplete component group");
                dropped += n;
            }
        }
    }
    (groups, dropped)
}

pub fn sort_by_onset(groups: &mut [ThreeComponent]) {
    groups.sort_by(|a, b| a.onset().total_cmp(&b.onset()));
}
