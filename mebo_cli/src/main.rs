use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use mebo_codecs::codec_for;
use mebo_core::decoder::BlobDecoder;
use mebo_core::encoder::{BlobEncoder, ColumnCodecs, EncoderOptions};
use mebo_core::endian::Endian;
use mebo_core::format::{CompressionKind, TimestampEncoding, ValueEncoding};
use mebo_core::hash::default_hash_id;

#[derive(Parser)]
#[command(name = "mebo", about = "Encode, inspect, and dump mebo time-series blobs", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, ValueEnum)]
enum TsEncodingArg {
    Raw,
    Delta,
}

#[derive(Copy, Clone, ValueEnum)]
enum ValEncodingArg {
    Raw,
    Gorilla,
}

#[derive(Copy, Clone, ValueEnum)]
enum CompressionArg {
    None,
    Zstd,
    S2,
    Lz4,
}

impl From<CompressionArg> for CompressionKind {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => CompressionKind::None,
            CompressionArg::Zstd => CompressionKind::Zstd,
            CompressionArg::S2 => CompressionKind::S2,
            CompressionArg::Lz4 => CompressionKind::Lz4,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic multi-metric blob and write it to disk
    Encode {
        /// Destination blob file
        output: PathBuf,
        /// Number of metrics to generate
        #[arg(long, default_value_t = 150)]
        metrics: usize,
        /// Points per metric
        #[arg(long, default_value_t = 10)]
        points: usize,
        #[arg(long, value_enum, default_value_t = TsEncodingArg::Delta)]
        timestamp_encoding: TsEncodingArg,
        #[arg(long, value_enum, default_value_t = ValEncodingArg::Gorilla)]
        value_encoding: ValEncodingArg,
        #[arg(long, value_enum, default_value_t = CompressionArg::None)]
        timestamp_compression: CompressionArg,
        #[arg(long, value_enum, default_value_t = CompressionArg::None)]
        value_compression: CompressionArg,
        /// Attach a rotating "host=N" tag to every point
        #[arg(long)]
        tags: bool,
        /// Embed a metric-names payload (hash-verified on decode)
        #[arg(long)]
        names: bool,
        #[arg(long, default_value_t = false)]
        big_endian: bool,
    },
    /// Print header, compression, and per-metric index summary
    Inspect {
        file: PathBuf,
        /// Print every metric's id and point count, not just the totals
        #[arg(long)]
        per_metric: bool,
    },
    /// Print the decoded points for one metric
    Dump {
        file: PathBuf,
        /// Metric name, hashed with the same function the blob was written with
        #[arg(long, conflicts_with = "metric_id")]
        name: Option<String>,
        /// Metric ID directly, bypassing hashing
        #[arg(long)]
        metric_id: Option<u64>,
        /// Maximum number of points to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn run_encode(
    output: PathBuf,
    metrics: usize,
    points: usize,
    ts_encoding: TsEncodingArg,
    val_encoding: ValEncodingArg,
    ts_compression: CompressionArg,
    val_compression: CompressionArg,
    tags: bool,
    names: bool,
    big_endian: bool,
) -> anyhow::Result<()> {
    let timestamp_encoding = match ts_encoding {
        TsEncodingArg::Raw => TimestampEncoding::Raw,
        TsEncodingArg::Delta => TimestampEncoding::Delta,
    };
    let value_encoding = match val_encoding {
        ValEncodingArg::Raw => ValueEncoding::Raw,
        ValEncodingArg::Gorilla => ValueEncoding::Gorilla,
    };
    let timestamp_compression: CompressionKind = ts_compression.into();
    let value_compression: CompressionKind = val_compression.into();

    let options = EncoderOptions {
        timestamp_encoding,
        value_encoding,
        timestamp_compression,
        value_compression,
        endian: if big_endian { Endian::Big } else { Endian::Little },
        has_tags: tags,
        emit_metric_names: names,
        ..Default::default()
    };
    let codecs = ColumnCodecs { timestamp: codec_for(timestamp_compression), value: codec_for(value_compression) };

    let start_time = 1_700_000_000_000_000i64;
    let mut encoder = BlobEncoder::new(start_time, options, codecs);

    let t0 = Instant::now();
    for m in 0..metrics {
        encoder.start_metric(&format!("metric.{m}"), points).with_context(|| format!("starting metric {m}"))?;
        let ts: Vec<i64> = (0..points as i64).map(|i| start_time + i * 1_000_000).collect();
        let vals: Vec<f64> = (0..points).map(|i| 10.0 + (m % 17) as f64 + (i as f64) * 0.1).collect();
        if tags {
            let tag_strs: Vec<&str> = (0..points).map(|i| if i % 2 == 0 { "host=a" } else { "host=b" }).collect();
            encoder.add_points(&ts, &vals, Some(&tag_strs))?;
        } else {
            encoder.add_points(&ts, &vals, None)?;
        }
        encoder.end_metric()?;
    }
    let bytes = encoder.finish().context("assembling blob")?;
    let elapsed = t0.elapsed();

    std::fs::write(&output, &bytes).with_context(|| format!("writing {output:?}"))?;

    let raw_estimate = (metrics * points * 16) as u64; // 8B ts + 8B val, uncompressed/uncoded baseline
    eprintln!("  metrics     : {metrics}");
    eprintln!("  points/each : {points}");
    eprintln!("  blob size   : {}", human_bytes(bytes.len() as u64));
    eprintln!("  raw estimate: {}", human_bytes(raw_estimate));
    eprintln!("  ratio       : {:.2}x", raw_estimate as f64 / bytes.len() as f64);
    eprintln!("  elapsed     : {:.3}ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}

fn run_inspect(file: PathBuf, per_metric: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(&file).with_context(|| format!("reading {file:?}"))?;
    let decoder =
        BlobDecoder::open_with_codecs(&bytes, default_hash_id, codec_for).with_context(|| "parsing blob")?;

    println!("=== mebo blob: {file:?} ===");
    println!("  file size       : {}", human_bytes(bytes.len() as u64));
    println!("  start time      : {} us", decoder.start_time());
    println!("  metric count    : {}", decoder.metric_count());
    println!("  endian          : {:?}", decoder.endian());
    println!("  timestamp codec : {:?}", decoder.timestamp_encoding());
    println!("  value codec     : {:?}", decoder.value_encoding());
    println!("  has tags        : {}", decoder.has_tags());
    println!("  has names       : {}", decoder.has_metric_names());

    if per_metric {
        println!();
        println!("  {:>20}  {:>8}", "metric_id", "count");
        println!("  {}", "-".repeat(32));
        for id in decoder.metric_ids() {
            println!("  {:>20}  {:>8}", id, decoder.count(id).unwrap_or(0));
        }
    }
    Ok(())
}

fn run_dump(file: PathBuf, name: Option<String>, metric_id: Option<u64>, limit: usize) -> anyhow::Result<()> {
    let bytes = std::fs::read(&file).with_context(|| format!("reading {file:?}"))?;
    let decoder = BlobDecoder::open_with_codecs(&bytes, default_hash_id, codec_for)?;

    let id = match (name, metric_id) {
        (Some(n), _) => default_hash_id(&n),
        (None, Some(id)) => id,
        (None, None) => anyhow::bail!("pass either --name or --metric-id"),
    };

    let rows = decoder.all(id).ok_or_else(|| anyhow::anyhow!("no metric with id {id}"))?;
    println!("  {:>20}  {:>16}  tag", "timestamp", "value");
    for (ts, val, tag) in rows.take(limit) {
        println!("  {ts:>20}  {val:>16}  {}", tag.unwrap_or_default());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Encode {
            output,
            metrics,
            points,
            timestamp_encoding,
            value_encoding,
            timestamp_compression,
            value_compression,
            tags,
            names,
            big_endian,
        } => run_encode(
            output,
            metrics,
            points,
            timestamp_encoding,
            value_encoding,
            timestamp_compression,
            value_compression,
            tags,
            names,
            big_endian,
        ),
        Commands::Inspect { file, per_metric } => run_inspect(file, per_metric),
        Commands::Dump { file, name, metric_id, limit } => run_dump(file, name, metric_id, limit),
    }
}
