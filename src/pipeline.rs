//! Station-by-station driver from raw three-component seismograms to a
//! picked Tpsb delay per station.
//!
//! Stations are processed independently up to the validated radial RFs
//! (optionally on the rayon pool), then joined: quality control, grouping
//! by station, stacking and picking run over the combined record set.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    cfg::PipelineCfg,
    decon::receiver_function,
    delay_table::DelayTable,
    error::{Error, Result},
    snr::{passes_snr, signoise},
    stack::{quality_control, stack_and_pick, StationGroups, StationStack},
    station_src::WaveformSource,
    stream::{group_by_onset, ThreeComponent},
    trace::{Component, Detrend, Trace},
    twtt::{autocorrelate, twtt},
    validate::{calc_cc_conv, check_direct_p, DirectPCheck},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoData,
    NoCompleteTriples,
    NoneAboveSnr,
    NoReceiverFunctions,
    NoValidRecords,
    RaggedStack,
    NoExtremum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Stacked {
        delay: f64,
        records: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        twtt: Option<f64>,
    },
    Skipped {
        reason: SkipReason,
    },
}

/// How many items survived each stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub traces: usize,
    pub selected: usize,
    pub triples: usize,
    pub incomplete_traces: usize,
    pub above_snr: usize,
    pub receiver_functions: usize,
    pub cc_checked: usize,
    pub cc_skipped: usize,
    pub direct_p: usize,
    pub validated: usize,
    pub stacked: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReport {
    pub station: String,
    pub counts: StageCounts,
    pub outcome: Outcome,
}

impl StationReport {
    pub fn delay(&self) -> Option<f64> {
        match self.outcome {
            Outcome::Stacked { delay, .. } => Some(delay),
            Outcome::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    /// One per requested station, in request order.
    pub reports: Vec<StationReport>,
    /// Stations with a delay, in delay-table order.
    pub stacks: Vec<StationStack>,
    /// Per stacked station, validated radial RFs cut to the wiggle window
    /// and sorted by back azimuth.
    pub wiggles: Vec<(String, Vec<Trace>)>,
    pub delays: DelayTable,
}

impl RunOutput {
    pub fn report(&self, station: &str) -> Option<&StationReport> {
        self.reports.iter().find(|r| r.station == station)
    }
}

/// Validated radial RFs of one station, or the stage that emptied it.
struct StationRun {
    station: String,
    counts: StageCounts,
    records: std::result::Result<Vec<Trace>, SkipReason>,
}

pub struct Pipeline {
    cfg: PipelineCfg,
}

impl Pipeline {
    pub fn new(cfg: PipelineCfg) -> Self {
        Pipeline { cfg }
    }

    pub fn cfg(&self) -> &PipelineCfg {
        &self.cfg
    }

    /// Narrows `available` station ids by the network and station filters.
    pub fn select_stations(&self, available: Vec<String>) -> Vec<String> {
        let sel = &self.cfg.selection;
        available
            .into_iter()
            .filter(|id| {
                let (net, sta) = id.split_once('.').unwrap_or(("", id.as_str()));
                (sel.networks.is_empty() || sel.networks.iter().any(|n| n == net))
                    && (sel.stations.is_empty()
                        || sel.stations.iter().any(|s| s == sta || s == id))
            })
            .collect()
    }

    fn selects(&self, tr: &Trace) -> bool {
        let sel = &self.cfg.selection;
        let s = &tr.stats;
        let in_range = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
        sel.start_time.map_or(true, |t0| s.event_time >= t0)
            && sel.end_time.map_or(true, |t1| s.event_time <= t1)
            && in_range(s.distance, sel.distance_range)
            && in_range(s.magnitude, sel.magnitude_range)
    }

    pub fn run<S>(&self, source: &S, stations: &[String]) -> Result<RunOutput>
    where
        S: WaveformSource + ?Sized,
    {
        info!(stations = stations.len(), parallel = self.cfg.parallel, "pipeline start");
        let runs: Vec<StationRun> = if self.cfg.parallel {
            stations
                .par_iter()
                .map(|s| self.process_station(source, s))
                .collect::<Result<_>>()?
        } else {
            stations
                .iter()
                .map(|s| self.process_station(source, s))
                .collect::<Result<_>>()?
        };
        Ok(self.stack_stations(runs))
    }

    fn process_station<S>(&self, source: &S, station: &str) -> Result<StationRun>
    where
        S: WaveformSource + ?Sized,
    {
        let mut counts = StageCounts::default();
        let records = match source.waveforms(station) {
            Ok(traces) => self.validated_records(station, traces, &mut counts),
            Err(err) if err.is_skip() => {
                warn!(station, %err, "no usable waveforms");
                Err(SkipReason::NoData)
            }
            Err(err) => return Err(err),
        };
        if let Err(reason) = records {
            warn!(station, ?reason, "station skipped");
        }
        Ok(StationRun {
            station: station.to_string(),
            counts,
            records,
        })
    }

    /// Selection, SNR screening, RF computation and validation.
    fn validated_records(
        &self,
        station: &str,
        traces: Vec<Trace>,
        counts: &mut StageCounts,
    ) -> std::result::Result<Vec<Trace>, SkipReason> {
        counts.traces = traces.len();
        let mut traces: Vec<Trace> = traces.into_iter().filter(|t| self.selects(t)).collect();
        counts.selected = traces.len();
        if traces.is_empty() {
            return Err(SkipReason::NoData);
        }

        if let Some(rate) = self.cfg.preprocess.resample_hz {
            traces.retain_mut(|t| match t.resample(rate) {
                Ok(_) => true,
                Err(err) => {
                    debug!(station, %err, "resampling failed, trace dropped");
                    false
                }
            });
        }

        let (groups, dropped) = group_by_onset(traces);
        counts.triples = groups.len();
        counts.incomplete_traces = dropped;
        if groups.is_empty() {
            return Err(SkipReason::NoCompleteTriples);
        }

        let signals = self.screen_snr(groups);
        counts.above_snr = signals.len();
        if signals.is_empty() {
            return Err(SkipReason::NoneAboveSnr);
        }

        let (rfs, signals) = self.receiver_functions(station, signals);
        counts.receiver_functions = rfs.len();
        if rfs.is_empty() {
            return Err(SkipReason::NoReceiverFunctions);
        }

        let cc = calc_cc_conv(rfs, &signals, &self.cfg.validation);
        counts.cc_checked = cc.cc.len();
        counts.cc_skipped = cc.skipped.len();
        for (i, err) in &cc.skipped {
            debug!(station, index = i, %err, "reconvolution check failed");
        }

        let q = &self.cfg.quality;
        let check = DirectPCheck {
            tolerance: q.direct_p_tolerance,
            ceiling: q.max_p_ceiling,
        };
        let mut radial = Vec::with_capacity(cc.rfs.len());
        for rf in cc.rfs {
            let Some(mut r) = rf.into_traces().into_iter().find(|t| t.component() == Component::R)
            else {
                continue;
            };
            let admitted = match check_direct_p(&mut r, &check) {
                Ok(admitted) => admitted,
                Err(err) => {
                    debug!(station, %err, "direct-P window unusable");
                    continue;
                }
            };
            if q.require_direct_p && !admitted {
                continue;
            }
            radial.push(r);
        }
        counts.direct_p = radial.len();

        if let Some(min) = q.cc_conv_min {
            radial.retain(|r| r.meta.cc_conv.map_or(false, |c| c >= min));
        }
        counts.validated = radial.len();
        info!(station, ?counts, "validated receiver functions");
        if radial.is_empty() {
            return Err(SkipReason::NoValidRecords);
        }
        Ok(radial)
    }

    fn screen_snr(&self, groups: Vec<ThreeComponent>) -> Vec<ThreeComponent> {
        groups
            .into_iter()
            .filter_map(|mut g| {
                let snr = g.select(Component::Z).map_or(0.0, signoise);
                g.for_each_mut(|t| t.meta.signoise = Some(snr));
                passes_snr(snr, self.cfg.quality.snr_min).then(|| g)
            })
            .collect()
    }

    /// Receiver functions with the raw signal triple each came from.
    fn receiver_functions(
        &self,
        station: &str,
        signals: Vec<ThreeComponent>,
    ) -> (Vec<ThreeComponent>, Vec<ThreeComponent>) {
        let mut rfs = Vec::with_capacity(signals.len());
        let mut kept = Vec::with_capacity(signals.len());
        for sig in signals {
            match self.receiver_function(&sig) {
                Ok(rf) => {
                    rfs.push(rf);
                    kept.push(sig);
                }
                Err(err) => debug!(station, onset = sig.onset(), %err, "no receiver function"),
            }
        }
        (rfs, kept)
    }

    fn receiver_function(&self, signal: &ThreeComponent) -> Result<ThreeComponent> {
        let p = &self.cfg.preprocess;
        let mut g = signal.clone();
        g.detrend(Detrend::Linear)
            .detrend(Detrend::Demean)
            .taper(p.taper_percentage, None)
            .bandpass(p.freqmin, p.freqmax, p.corners, false)?
            .trim2(p.rf_window.0, p.rf_window.1);
        if !g.is_aligned() {
            return Err(Error::Degenerate("components differ after trimming".into()));
        }
        g.rotate_ne_rt()?;
        receiver_function(&g, &self.cfg.rf)
    }

    /// Joins the per-station runs: QC, grouping, stacking, picking.
    fn stack_stations(&self, runs: Vec<StationRun>) -> RunOutput {
        let q = &self.cfg.quality;
        let taper = self.cfg.preprocess.taper_percentage;

        let mut reports = Vec::with_capacity(runs.len());
        let mut validated = Vec::new();
        for run in runs {
            let outcome = match run.records {
                Ok(records) => {
                    validated.extend(records);
                    Outcome::Skipped {
                        reason: SkipReason::NoValidRecords,
                    }
                }
                Err(reason) => Outcome::Skipped { reason },
            };
            reports.push(StationReport {
                station: run.station,
                counts: run.counts,
                outcome,
            });
        }

        let wiggle_source = quality_control(
            validated.clone(),
            q.slope_ratio_min,
            taper,
            self.cfg.stack.wiggle_window,
        );
        let groups: StationGroups =
            quality_control(validated, q.slope_ratio_min, taper, q.qc_window)
                .into_iter()
                .collect();
        info!(stations = groups.len(), "stacking");

        let s = &self.cfg.stack;
        let picked: Vec<(String, Result<StationStack>)> = groups
            .iter()
            .map(|(id, records)| (id.to_string(), stack_and_pick(id, records, s.method, s.picker)))
            .collect();

        let mut stacks = Vec::new();
        let mut by_station: HashMap<String, Outcome> = HashMap::new();
        for (id, result) in picked {
            let outcome = match result {
                Ok(mut st) => {
                    if s.twtt {
                        st.stack.meta.twtt = match autocorrelate(&st.stack).and_then(|a| twtt(&a)) {
                            Ok(t) => Some(t),
                            Err(err) => {
                                warn!(station = %id, %err, "no twtt pick");
                                None
                            }
                        };
                    }
                    let outcome = Outcome::Stacked {
                        delay: st.delay(),
                        records: st.records.len(),
                        twtt: st.stack.meta.twtt,
                    };
                    stacks.push(st);
                    outcome
                }
                Err(err) => {
                    warn!(station = %id, %err, "stack skipped");
                    Outcome::Skipped {
                        reason: match err {
                            Error::RaggedStack { .. } => SkipReason::RaggedStack,
                            Error::NoExtremum(_) => SkipReason::NoExtremum,
                            _ => SkipReason::NoValidRecords,
                        },
                    }
                }
            };
            by_station.insert(id, outcome);
        }

        for report in reports.iter_mut() {
            if let Some(records) = groups.get(&report.station) {
                report.counts.stacked = records.len();
            }
            if let Some(outcome) = by_station.remove(&report.station) {
                report.outcome = outcome;
            }
        }

        let delays: DelayTable = stacks
            .iter()
            .map(|st| (st.station.clone(), st.delay()))
            .collect();
        stacks.sort_by(|a, b| b.delay().total_cmp(&a.delay()));

        let mut wiggle_groups: StationGroups = wiggle_source.into_iter().collect();
        let wiggles = stacks
            .iter()
            .map(|st| {
                let records = wiggle_groups.take(&st.station).unwrap_or_default();
                (st.station.clone(), records)
            })
            .collect();

        let stacked = reports.iter().filter(|r| r.delay().is_some()).count();
        info!(stacked, skipped = reports.len() - stacked, "pipeline done");
        RunOutput {
            reports,
            stacks,
            wiggles,
            delays,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station_src::{SyntheticSource, SyntheticStation};

    fn pipeline() -> Pipeline {
        let mut cfg = PipelineCfg::default();
        cfg.parallel = false;
        Pipeline::new(cfg)
    }

    #[test]
    fn station_filters() {
        let mut cfg = PipelineCfg::default();
        cfg.selection.networks = vec!["AU".into()];
        cfg.selection.stations = vec!["CNB".into(), "S1.X".into()];
        let p = Pipeline::new(cfg);
        let ids = vec!["AU.CNB".to_string(), "AU.ARMA".to_string(), "S1.X".to_string()];
        assert_eq!(p.select_stations(ids), vec!["AU.CNB".to_string()]);
    }

    #[test]
    fn missing_station_is_skipped_not_fatal() {
        let src = SyntheticSource::new(vec![], 1);
        let out = pipeline().run(&src, &["XX.NONE".to_string()]).unwrap();
        assert_eq!(out.reports.len(), 1);
        assert_eq!(
            out.reports[0].outcome,
            Outcome::Skipped {
                reason: SkipReason::NoData
            }
        );
        assert!(out.delays.is_empty());
    }

    #[test]
    fn out_of_range_events_are_deselected() {
        let src = SyntheticSource::new(vec![SyntheticStation::new("SY", "A", 0.5)], 1);
        let mut cfg = PipelineCfg::default();
        cfg.parallel = false;
        cfg.selection.magnitude_range = (9.0, 10.0);
        let out = Pipeline::new(cfg).run(&src, &["SY.A".to_string()]).unwrap();
        let r = out.report("SY.A").unwrap();
        assert_eq!(r.counts.traces, 24);
        assert_eq!(r.counts.selected, 0);
        assert_eq!(r.delay(), None);
    }

    #[test]
    fn impossible_slope_threshold_leaves_delay_table_empty() {
        let src = SyntheticSource::new(vec![SyntheticStation::new("SY", "A", 0.5)], 3);
        let mut cfg = PipelineCfg::default();
        cfg.parallel = false;
        cfg.quality.require_direct_p = false;
        cfg.quality.slope_ratio_min = f64::MAX;
        let out = Pipeline::new(cfg).run(&src, &["SY.A".to_string()]).unwrap();
        assert!(out.delays.get("SY.A").is_none());
        assert!(out.stacks.is_empty());
        assert_eq!(out.report("SY.A").unwrap().delay(), None);
    }
}
