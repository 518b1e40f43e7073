use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List available MIDI ports
    #[arg(long)]
    pub port_list: bool,

    /// Port settings file (TOML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Create virtual ports instead of connecting to hardware
    #[arg(long)]
    pub manual_ports: bool,

    /// Send clock to every clocked output for the given number of bars
    #[arg(long, value_name = "BARS")]
    pub clock_test: Option<u32>,

    /// Tempo used by --clock-test
    #[arg(long, default_value_t = 120)]
    pub bpm: u32,

    /// Keep running and follow ports as they come and go
    #[arg(long)]
    pub watch: bool,
}

pub fn handle_port_list() -> Vec<String> {
    // Re-export from the crate root
    crate::handle_port_list()
}
