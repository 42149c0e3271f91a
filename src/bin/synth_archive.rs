use progress_bar::*;

use clap::Parser;

use sedthick::{
    archive::write_station,
    station::{Inventory, StationInfo},
    station_src::{SyntheticSource, SyntheticStation, WaveformSource},
};

use std::{fs::create_dir_all, path::PathBuf};

use tracing::error;
use tracing_subscriber::EnvFilter;

/// NET.STA:delay[:lat:lon]
fn parse_station(s: &str) -> Result<(SyntheticStation, Option<(f64, f64)>), String> {
    let fields: Vec<&str> = s.split(':').collect();
    let (id, delay, coords) = match fields[..] {
        [id, delay] => (id, delay, None),
        [id, delay, lat, lon] => (id, delay, Some((lat, lon))),
        _ => return Err(format!("expected NET.STA:delay[:lat:lon], got {s:?}")),
    };
    let (net, sta) = id
        .split_once('.')
        .ok_or_else(|| format!("station id {id:?} is not NET.STA"))?;
    let delay: f64 = delay.parse().map_err(|_| format!("bad delay {delay:?}"))?;
    let coords = match coords {
        Some((lat, lon)) => Some((
            lat.parse().map_err(|_| format!("bad latitude {lat:?}"))?,
            lon.parse().map_err(|_| format!("bad longitude {lon:?}"))?,
        )),
        None => None,
    };
    Ok((SyntheticStation::new(net, sta, delay), coords))
}

#[derive(Debug, Parser)]
#[clap(author, about, version)]
struct Args {
    #[clap(short('o'), long("out"), value_name("archive dir"))]
    outdir: PathBuf,

    #[clap(short('s'), long("station"), value_name("NET.STA:delay[:lat:lon]"), value_parser = parse_station, required(true))]
    stations: Vec<(SyntheticStation, Option<(f64, f64)>)>,

    #[clap(short('n'), long("events"), value_name("events per station"), default_value("8"))]
    events: usize,

    #[clap(long("noise"), value_name("noise std"), default_value("0.01"))]
    noise: f64,

    #[clap(long("seed"), default_value("0"))]
    seed: u64,

    /// Where to write a station inventory for stations given with coordinates
    #[clap(short('i'), long("inventory"), value_name("inventory yaml"))]
    inventory: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let inventory = Inventory::new(
        args.stations
            .iter()
            .filter_map(|(s, c)| {
                c.map(|(latitude, longitude)| StationInfo {
                    network: s.network.clone(),
                    code: s.code.clone(),
                    latitude,
                    longitude,
                    elevation: 0.0,
                })
            })
            .collect(),
    );

    let mut src = SyntheticSource::new(args.stations.into_iter().map(|(s, _)| s).collect(), args.seed);
    src.n_events = args.events;
    src.noise = args.noise;

    if let Err(err) = create_dir_all(&args.outdir) {
        error!(%err, "cannot create archive dir");
        std::process::exit(1);
    }

    init_progress_bar(src.stations.len());
    set_progress_bar_action("Writing", Color::Blue, Style::Bold);
    for sta in src.stations.iter() {
        let id = sta.id();
        let written = src
            .waveforms(&id)
            .and_then(|traces| write_station(&args.outdir, &id, &traces));
        if let Err(err) = written {
            print_progress_bar_info("Failed", &format!("{id}: {err}"), Color::Red, Style::Bold);
        }
        inc_progress_bar();
    }
    finalize_progress_bar();

    if let Some(path) = args.inventory {
        if let Err(err) = inventory.to_file(&path) {
            error!(%err, path = %path.display(), "cannot write inventory");
            std::process::exit(1);
        }
    }
}
