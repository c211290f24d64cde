use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reelaudio")]
#[command(about = "Extract mp3 audio from Instagram reels and posts", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (overrides REELAUDIO_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Run one request and leave the mp3 in the output directory
    Fetch(FetchArgs),
    /// Print the persisted download counter
    Stats,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Reel or post URL
    pub url: String,
}
