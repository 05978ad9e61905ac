//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `inspect`, `batches`, and `gen`.
//!
//! Examples:
//! ```bash
//! affect-cli gen      /tmp/mosi.npz --samples 64 --steps 20
//! affect-cli inspect  /tmp/mosi.npz
//! affect-cli batches  /tmp/mosi.npz -b 16 --max-pad --max-seq-len 10
//! affect-cli -v batches /data/meld.npz --data-type meld --limit 3
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use ndarray::{Array, Array2, Array3, ArrayD, IxDyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use affectdl::data_formats::{write_meld_npz, write_sentiment_npz};
use affectdl::dataset::DynStream;
use affectdl::{
    get_dataloader, AffectConfig, AffectLoaders, DataType, MalformedPolicy, MeldBatch, MeldDataset,
    MeldRecord, RawSplit, SentimentBatch, SentimentSplits, Task,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SplitArg {
    Train,
    Valid,
    Test,
}

#[derive(Subcommand)]
enum Command {
    /// Show sample counts and feature shapes of a data file.
    Inspect {
        file: PathBuf,

        #[arg(short = 'd', long = "data-type", value_enum, default_value_t = DataType::Mosi)]
        data_type: DataType,
    },
    /// Stream collated batches and print their shapes.
    Batches {
        file: PathBuf,

        #[arg(short = 'd', long = "data-type", value_enum, default_value_t = DataType::Mosi)]
        data_type: DataType,

        #[arg(short = 'b', long = "batch-size", default_value_t = 32)]
        batch_size: usize,

        /// Time-axis cap for --max-pad and --normalize-splits.
        #[arg(long = "max-seq-len", default_value_t = 50)]
        max_seq_len: usize,

        /// Pad every sequence to --max-seq-len inside the dataset.
        #[arg(long = "max-pad")]
        max_pad: bool,

        /// Flatten each modality to one dimension.
        #[arg(long = "flatten")]
        flatten: bool,

        #[arg(long = "task", value_enum)]
        task: Option<Task>,

        /// Z-normalize every sample along time.
        #[arg(long = "z-norm")]
        z_norm: bool,

        /// Z-normalize whole splits at load time.
        #[arg(long = "normalize-splits")]
        normalize_splits: bool,

        /// Concurrent sample fetches (0 = number of CPUs).
        #[arg(short = 'j', long = "workers", default_value_t = 2)]
        workers: usize,

        #[arg(long = "seed", default_value_t = 0)]
        seed: u64,

        #[arg(long = "no-shuffle")]
        no_shuffle: bool,

        #[arg(long = "on-malformed", value_enum, default_value_t = MalformedPolicy::Abort)]
        on_malformed: MalformedPolicy,

        /// Split to iterate (sentiment data only).
        #[arg(short = 's', long = "split", value_enum, default_value_t = SplitArg::Train)]
        split: SplitArg,

        /// Stop after this many batches.
        #[arg(short = 'n', long = "limit")]
        limit: Option<usize>,
    },
    /// Write a synthetic data file with random features.
    Gen {
        out: PathBuf,

        #[arg(short = 'd', long = "data-type", value_enum, default_value_t = DataType::Mosi)]
        data_type: DataType,

        /// Samples per split (sentiment) or records (meld).
        #[arg(short = 'n', long = "samples", default_value_t = 64)]
        samples: usize,

        /// Time steps per sample.
        #[arg(short = 't', long = "steps", default_value_t = 20)]
        steps: usize,

        #[arg(long = "seed", default_value_t = 42)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.cmd {
        Command::Inspect { file, data_type } => inspect_cmd(file, data_type)?,
        Command::Batches {
            file, data_type, batch_size, max_seq_len, max_pad, flatten, task, z_norm,
            normalize_splits, workers, seed, no_shuffle, on_malformed, split, limit,
        } => {
            let cfg = AffectConfig::default()
                .data_type(data_type)
                .with_batch_size(batch_size)
                .max_seq_len(max_seq_len)
                .max_pad(max_pad)
                .flatten_time_series(flatten)
                .task(task)
                .z_norm(z_norm)
                .normalize_splits(normalize_splits)
                .num_workers(workers)
                .seed(seed)
                .train_shuffle(!no_shuffle)
                .malformed(on_malformed);
            batches_cmd(file, &cfg, split, limit).await?;
        }
        Command::Gen { out, data_type, samples, steps, seed } => {
            gen_cmd(out, data_type, samples, steps, seed)?;
        }
    }
    Ok(())
}

fn inspect_cmd(file: PathBuf, data_type: DataType) -> Result<()> {
    if data_type.is_sentiment() {
        let splits = affectdl::data_formats::read_sentiment_npz(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        for (name, split) in splits.iter() {
            safe_println!(
                "{name:<6} samples={:<6} text={:?} audio={:?} vision={:?} labels={:?}",
                split.len(),
                &split.text.shape()[1..],
                &split.audio.shape()[1..],
                &split.vision.shape()[1..],
                &split.labels.shape()[1..],
            );
        }
    } else {
        let ds = MeldDataset::from_path(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        safe_println!("records={} lav_dim={:?}", ds.records().len(), ds.lav_dim());
    }
    Ok(())
}

async fn batches_cmd(file: PathBuf, cfg: &AffectConfig, split: SplitArg, limit: Option<usize>) -> Result<()> {
    let loaders = get_dataloader(&file, cfg)
        .with_context(|| format!("loading {}", file.display()))?;

    match loaders {
        AffectLoaders::Sentiment { train, valid, test } => {
            let loader = match split {
                SplitArg::Train => train,
                SplitArg::Valid => valid,
                SplitArg::Test => test,
            };
            info!(batches = loader.num_batches(), "iterating {:?}", split);
            print_batches(loader.stream(), limit, describe_sentiment).await
        }
        AffectLoaders::Meld(loader) => {
            info!(batches = loader.num_batches(), "iterating meld");
            print_batches(loader.stream(), limit, describe_meld).await
        }
    }
}

async fn print_batches<B>(mut stream: DynStream<B>, limit: Option<usize>, describe: fn(&B) -> String) -> Result<()>
where
    B: Send + 'static,
{
    let mut n = 0usize;
    while let Some(batch) = stream.next().await {
        if limit.is_some_and(|l| n >= l) {
            break;
        }
        let batch = batch.with_context(|| format!("batch {n}"))?;
        safe_println!("batch {n:>4}: {}", describe(&batch));
        n += 1;
    }
    safe_println!("{n} batches");
    Ok(())
}

fn describe_sentiment(batch: &SentimentBatch) -> String {
    match batch {
        SentimentBatch::Sequence(b) => format!(
            "vision={:?} audio={:?} text={:?} labels={}",
            b.inputs[0].shape(),
            b.inputs[1].shape(),
            b.inputs[2].shape(),
            b.labels.len()
        ),
        SentimentBatch::Padded(b) => format!(
            "vision={:?} audio={:?} text={:?} labels={}",
            b.vision.shape(),
            b.audio.shape(),
            b.text.shape(),
            b.labels.len()
        ),
    }
}

fn describe_meld(batch: &MeldBatch) -> String {
    format!(
        "text={:?} visual={:?} acoustic={:?} lengths={}",
        batch.text.shape(),
        batch.visual.shape(),
        batch.acoustic.shape(),
        batch.lengths
    )
}

fn unit(rng: &mut ChaCha20Rng) -> f32 {
    rng.random_range(-1.0..1.0)
}

fn random_split(rng: &mut ChaCha20Rng, n: usize, steps: usize) -> Result<RawSplit> {
    let mut seq = |f: usize| Array3::from_shape_simple_fn((n, steps, f), || unit(rng));
    let text = seq(300);
    let audio = seq(5);
    let vision = seq(20);
    let labels = ArrayD::from_shape_simple_fn(IxDyn(&[n, 1, 1]), || unit(rng) * 3.0);
    Ok(RawSplit::new(text, audio, vision, labels)?)
}

fn gen_cmd(out: PathBuf, data_type: DataType, samples: usize, steps: usize, seed: u64) -> Result<()> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    if data_type.is_sentiment() {
        let splits = SentimentSplits {
            train: random_split(&mut rng, samples, steps)?,
            valid: random_split(&mut rng, samples.div_ceil(4), steps)?,
            test: random_split(&mut rng, samples.div_ceil(4), steps)?,
        };
        write_sentiment_npz(&out, &splits).with_context(|| format!("writing {}", out.display()))?;
    } else {
        let steps = steps.max(1);
        let records: Vec<MeldRecord> = (0..samples)
            .map(|i| {
                let tokens = rng.random_range(1..=steps);
                let frames = rng.random_range(1..=steps);
                MeldRecord {
                    id: format!("utt{i:05}"),
                    token_ids: Array::from_shape_simple_fn(tokens, || rng.random_range(0..30_000i64)),
                    video_features: Array2::from_shape_simple_fn((frames, 35), || unit(&mut rng)),
                    audio_features: Array2::from_shape_simple_fn((frames, 74), || unit(&mut rng)),
                    label: rng.random_range(0..7),
                }
            })
            .collect();
        write_meld_npz(&out, &records).with_context(|| format!("writing {}", out.display()))?;
    }
    safe_println!("wrote {}", out.display());
    Ok(())
}
