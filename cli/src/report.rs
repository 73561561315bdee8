use clap::Args;
use eyre::Result;
use timevector::{RawKey, Report, Threshold};
use tokio::io::AsyncWriteExt;

use crate::io::{read_dataset, Output};

#[derive(Args, Debug)]
pub struct Opts {
    /// Report type (text, json)
    #[clap(long, name = "type", default_value = "text")]
    pub report_type: String,

    /// Maximum number of points per segment (0 = keep everything)
    #[clap(long, short = 't', default_value = "50", env = "TIMEVECTOR_THRESHOLD")]
    pub threshold: Threshold,

    /// Only keep points with keys at or after this one
    #[clap(long)]
    pub from: Option<RawKey>,

    /// Only keep points with keys at or before this one
    #[clap(long)]
    pub until: Option<RawKey>,

    /// Number of segments downsampled concurrently
    #[clap(long, default_value_t = num_cpus::get(), env = "TIMEVECTOR_WORKERS")]
    pub workers: usize,

    /// Output file [default: stdout]
    #[clap(long, default_value = "stdout")]
    pub output: String,

    /// Input files [default: stdin]
    pub files: Vec<String>,
}

pub async fn report(opts: &Opts) -> Result<()> {
    let dataset = read_dataset(&opts.files, opts.from, opts.until).await?;
    let before = dataset.summaries();
    let after = dataset
        .downsample(opts.threshold, opts.workers)
        .await?
        .summaries();
    let report = Report::new(opts.threshold, &before, &after);

    let mut buf = Vec::new();
    match opts.report_type.as_str() {
        "text" => timevector::report_text(&report, &mut buf)?,
        "json" => timevector::report_json(&report, &mut buf)?,
        other => eyre::bail!("unknown report type: {}", other),
    }

    let mut output = Output::from_filename(&opts.output).await?;
    output.write_all(&buf).await?;
    output.flush().await?;
    Ok(())
}
