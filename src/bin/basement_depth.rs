use clap::Parser;

use sedthick::{delay_table::DelayTable, depth::BasementDepthTable, station::Inventory};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(author, about, version)]
struct Args {
    #[clap(short('d'), long("delays"), value_name("delay file"))]
    delays: String,

    #[clap(short('i'), long("inventory"), value_name("inventory yaml"))]
    inventory: String,

    #[clap(short('o'), long("out"), value_name("output file"), default_value("basement_depth.txt"))]
    out: String,
}

fn run(args: &Args) -> sedthick::Result<()> {
    let delays = DelayTable::read(&args.delays)?;
    let inventory = Inventory::from_file(&args.inventory)?;
    let table = BasementDepthTable::build(&delays, &inventory);
    table.write(&args.out)?;
    info!(stations = table.len(), out = %args.out, "basement depths written");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        error!(%err, "failed");
        std::process::exit(1);
    }
}
