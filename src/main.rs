use clap::Parser;

use sedthick::{
    cfg::PipelineCfg, pipeline::Pipeline, report::write_outputs, station::Inventory,
    station_src::{ArchiveSource, WaveformSource},
};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(author, about, version)]
struct Args {
    #[clap(short('c'), long("cfg"), value_name("config file"))]
    cfg: String,

    /// Station ids (NET.STA) to process instead of the whole archive
    #[clap(short('s'), long("station"), value_name("station"))]
    stations: Vec<String>,

    #[clap(long("serial"))]
    serial: bool,
}

fn run(args: Args) -> sedthick::Result<()> {
    let mut cfg = PipelineCfg::from_file(&args.cfg)?;
    if args.serial {
        cfg.parallel = false;
    }
    let inventory = cfg
        .io
        .inventory_file
        .as_ref()
        .map(Inventory::from_file)
        .transpose()?;

    let source = ArchiveSource::new(&cfg.io.archive_dir);
    let pipeline = Pipeline::new(cfg);
    let stations = if args.stations.is_empty() {
        pipeline.select_stations(source.stations()?)
    } else {
        args.stations
    };
    info!(stations = stations.len(), archive = %source.root.display(), "processing");

    let output = pipeline.run(&source, &stations)?;
    write_outputs(&output, pipeline.cfg(), inventory.as_ref())?;
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(Args::parse()) {
        error!(%err, "run failed");
        std::process::exit(1);
    }
}
