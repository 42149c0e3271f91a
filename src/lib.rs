pub mod archive;
pub mod cfg;
pub mod constants;
pub mod decon;
pub mod delay_table;
pub mod depth;
pub mod error;
pub mod filter;
pub mod moveout;
pub mod pipeline;
pub mod report;
pub mod snr;
pub mod stack;
pub mod station;
pub mod station_src;
pub mod stream;
pub mod trace;
pub mod twtt;
pub mod utils;
pub mod validate;

pub use error::{Error, Result};
