mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use reelaudio::config::Config;
use reelaudio::observability::init_tracing;
use reelaudio::pipeline::PipelineOutcome;
use reelaudio::stats::StatsCounter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .map_err(|e| format!("Failed to load config: {}", e))?;

    match cli.command {
        Commands::Serve(args) => server::run(config, args.address).await?,
        Commands::Fetch(args) => {
            let pipeline = server::build_pipeline(&config)?;
            match pipeline.run(&args.url).await? {
                PipelineOutcome::Served(audio) => {
                    println!("{}", audio.path.display());
                }
                PipelineOutcome::NotAVideo => {
                    println!("not a video: nothing to extract");
                }
            }
        }
        Commands::Stats => {
            let stats = StatsCounter::open(&config.storage.stats_file).snapshot();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
