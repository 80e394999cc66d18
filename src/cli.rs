//! Command-line interface definition using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Text chat with one nearby device over Bluetooth Low Energy
#[derive(Parser, Debug)]
#[command(name = "chippy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print events and messages as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Directory holding link_config.json
    #[arg(long, value_name = "DIR", default_value = "config")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List devices advertising the Chippy service
    Scan {
        /// How long to scan for
        #[arg(long, value_name = "SECONDS", default_value_t = 10)]
        seconds: u64,
    },

    /// Connect to a device as the client and chat over stdin/stdout
    Chat {
        /// Address or advertised name of the device
        device: String,

        /// How long to look for the device before giving up
        #[arg(long, value_name = "SECONDS", default_value_t = 10)]
        scan_seconds: u64,
    },

    /// Advertise the Chippy service and chat with the first client
    Serve,
}
