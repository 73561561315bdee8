mod downsample;
mod io;
mod plot;
mod report;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "timevector",
    about = "Shape-preserving downsampling of time series with Largest-Triangle-Three-Buckets"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Downsample series and write the reduced points
    Downsample(downsample::Opts),
    /// Summarize how much each segment shrinks
    Report(report::Opts),
    /// Generate HTML plot of the downsampled series
    Plot(plot::Opts),
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Downsample(opts) => downsample::downsample(&opts).await,
        Command::Report(opts) => report::report(&opts).await,
        Command::Plot(opts) => plot::plot(&opts).await,
    }
}
