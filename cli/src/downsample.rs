use clap::{Args, ValueEnum};
use eyre::Result;
use timevector::{Codec, CsvCodec, JsonCodec, RawKey, Threshold};
use tokio::io::AsyncWriteExt;

use crate::io::{read_dataset, Output};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Encoding {
    /// One JSON object per point
    Json,
    /// segment,key,value rows
    Csv,
    /// A single [{"name", "data"}] chart payload
    Chart,
}

#[derive(Args, Debug)]
pub struct Opts {
    /// Maximum number of points per segment (0 = keep everything)
    #[clap(long, short = 't', default_value = "50", env = "TIMEVECTOR_THRESHOLD")]
    pub threshold: Threshold,

    /// Only keep points with keys at or after this one
    #[clap(long)]
    pub from: Option<RawKey>,

    /// Only keep points with keys at or before this one
    #[clap(long)]
    pub until: Option<RawKey>,

    /// Output encoding
    #[clap(long, value_enum, default_value = "json")]
    pub to: Encoding,

    /// Number of segments downsampled concurrently
    #[clap(long, default_value_t = num_cpus::get(), env = "TIMEVECTOR_WORKERS")]
    pub workers: usize,

    /// Output file [default: stdout]
    #[clap(long, default_value = "stdout")]
    pub output: String,

    /// Input files [default: stdin]
    pub files: Vec<String>,
}

pub async fn downsample(opts: &Opts) -> Result<()> {
    let dataset = read_dataset(&opts.files, opts.from, opts.until).await?;
    let points = dataset.len();
    let downsampled = dataset.downsample(opts.threshold, opts.workers).await?;
    tracing::info!(
        points,
        sampled = downsampled.len(),
        threshold = %opts.threshold,
        "downsampled dataset"
    );

    let mut output = Output::from_filename(&opts.output).await?;
    match opts.to {
        Encoding::Chart => {
            let mut buf = Vec::new();
            timevector::write_chart_json(&downsampled, &mut buf)?;
            output.write_all(&buf).await?;
        }
        Encoding::Json => {
            for record in downsampled.into_records() {
                JsonCodec.encode(&mut output, &record).await?;
            }
        }
        Encoding::Csv => {
            let codec = CsvCodec::new();
            for record in downsampled.into_records() {
                codec.encode(&mut output, &record).await?;
            }
        }
    }
    output.flush().await?;
    Ok(())
}
