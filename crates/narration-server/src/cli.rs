use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "narration-server", version)]
pub struct Args {
    /// HTTP bind address, e.g. 127.0.0.1:5580
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Server config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}
