//! `bzcat` — the external CLI collaborator driving `bzcat_core`
//! (SPEC_FULL.md §1), grounded on `bz2zstd`'s own `main.rs`: a
//! `clap::Parser` args struct, `anyhow::Result` throughout, `memmap2` for
//! the input, `indicatif` for progress. Unlike the teacher (which always
//! recompresses to zstd) this binary's job is the core's own: decompress
//! to stdout or a file, optionally exporting/importing a persisted
//! `GZIDX` index.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use memmap2::Mmap;

use bzcat_core::byte_source::SliceSource;
use bzcat_core::format::{self, Format};
use bzcat_core::index::Index;
use bzcat_core::{Codec, ParallelReader, TrailingGarbagePolicy};

#[derive(Parser, Debug)]
#[command(author, version, about = "Random-access parallel bzip2/gzip cat", long_about = None)]
struct Args {
    /// Compressed input file (bzip2 or gzip; auto-detected).
    input: PathBuf,

    /// Write decompressed output here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Decode worker threads (also bounds the block-finder's scanner
    /// threads, divided by 8 per spec.md §4.4).
    #[arg(short = 'j', long, default_value_t = default_parallelism())]
    parallelism: usize,

    /// Treat unrecognized bytes after a stream's end-of-stream marker as
    /// a warning instead of a hard error (spec.md §9's open question,
    /// resolved as `TrailingGarbagePolicy`).
    #[arg(long)]
    ignore_invalid: bool,

    /// After decoding, write the discovered block-offset table to this
    /// `GZIDX` file (spec.md §6) for fast reopening later.
    #[arg(long)]
    export_index: Option<PathBuf>,

    /// Skip the block-magic scan entirely and import a previously
    /// exported `GZIDX` index instead.
    #[arg(long)]
    import_index: Option<PathBuf>,

    /// Checkpoint spacing recorded in an exported index's header. Every
    /// block this crate discovers is written as a checkpoint regardless
    /// of this value — it's write-only metadata, not a control over which
    /// offsets get indexed.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    checkpoint_spacing: u32,
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let mmap = unsafe { Mmap::map(&file).context("failed to mmap input file")? };
    let data: Arc<Mmap> = Arc::new(mmap);

    let codec = {
        let mut probe = SliceSource::new(data.clone());
        match format::detect(&mut probe).context("could not identify compressed stream format")? {
            Format::Bzip2 => Codec::Bzip2,
            Format::Gzip => Codec::Gzip,
        }
    };

    let policy = if args.ignore_invalid {
        TrailingGarbagePolicy::Warn
    } else {
        TrailingGarbagePolicy::Error
    };

    let mut reader = ParallelReader::open(data.clone(), codec, args.parallelism, policy)
        .context("failed to open parallel reader")?;

    if let Some(import_path) = &args.import_index {
        let mut f = File::open(import_path)
            .with_context(|| format!("failed to open index {}", import_path.display()))?;
        let index = Index::read(&mut f).context("failed to parse GZIDX index")?;
        let entries = index.to_block_offsets().context("empty index")?;
        reader
            .set_block_offsets(entries)
            .context("failed to import block-offset index")?;
    }

    let out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    cat(&mut reader, out, data.len() as u64)?;

    if let Some(export_path) = &args.export_index {
        let entries = reader.block_offsets().context("failed to finalize block map")?;
        let index = Index::from_block_offsets(&entries, args.checkpoint_spacing, data.len() as u64);
        let mut f = File::create(export_path)
            .with_context(|| format!("failed to create index {}", export_path.display()))?;
        index.write(&mut f).context("failed to write GZIDX index")?;
    }

    Ok(())
}

/// Streams the full decompressed output through `out`, with a progress
/// bar tracking bytes of *compressed input* consumed — the only total
/// known up front, since the decompressed size isn't known until the
/// block map finalizes.
fn cat(reader: &mut ParallelReader, mut out: Box<dyn Write>, input_len: u64) -> Result<()> {
    let pb = ProgressBar::new(input_len);
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )
        .unwrap(),
    );

    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = reader.read(&mut buf).context("decode error")?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).context("failed to write output")?;
        pb.set_position(reader.tell_compressed() / 8);
    }
    out.flush().context("failed to flush output")?;
    pb.finish_and_clear();
    Ok(())
}
