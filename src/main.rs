//! Rgss CLI - Command-line tool for RPG Maker encrypted archives.
//!
//! This is the main entry point for the rgss command-line application.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};

use rgss::prelude::*;

/// Rgss - RPG Maker archive browsing and extraction tool
#[derive(Parser)]
#[command(name = "rgss")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Maximum log level written to stderr
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries of an archive
    List {
        /// Path to the archive
        #[arg(short, long, env = "RGSS_ARCHIVE")]
        archive: PathBuf,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show offsets and keys
        #[arg(short, long)]
        detailed: bool,

        /// Print entries as JSON
        #[arg(long, conflicts_with = "detailed")]
        json: bool,
    },

    /// Extract entries to a directory
    Extract {
        /// Path to the archive
        #[arg(short, long, env = "RGSS_ARCHIVE")]
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Write one entry to stdout
    Cat {
        /// Path to the archive
        #[arg(short, long, env = "RGSS_ARCHIVE")]
        archive: PathBuf,

        /// Entry path inside the archive
        path: String,

        /// First byte to write
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Number of bytes to write
        #[arg(long)]
        length: Option<u64>,
    },

    /// List a directory of the archive
    Ls {
        /// Path to the archive
        #[arg(short, long, env = "RGSS_ARCHIVE")]
        archive: PathBuf,

        /// Directory inside the archive
        #[arg(default_value = "/")]
        path: String,
    },

    /// Show archive summary
    Info {
        /// Path to the archive
        #[arg(short, long, env = "RGSS_ARCHIVE")]
        archive: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::List {
            archive,
            filter,
            detailed,
            json,
        } => {
            cmd_list(&archive, filter.as_deref(), detailed, json)?;
        }
        Commands::Extract {
            archive,
            output,
            filter,
        } => {
            cmd_extract(&archive, &output, filter.as_deref())?;
        }
        Commands::Cat {
            archive,
            path,
            offset,
            length,
        } => {
            cmd_cat(&archive, &path, offset, length)?;
        }
        Commands::Ls { archive, path } => {
            cmd_ls(&archive, &path)?;
        }
        Commands::Info { archive } => {
            cmd_info(&archive)?;
        }
    }

    Ok(())
}

fn open_archive(path: &Path) -> Result<Archive> {
    Archive::open(path).map_err(|err| {
        let message = open_error_message(path, &err);
        anyhow::Error::new(err).context(message)
    })
}

/// Context line for a failed open, with the error kind and offset.
fn open_error_message(path: &Path, err: &rgss::archive::Error) -> String {
    let mut message = format!("Failed to open archive {} ({:?}", path.display(), err.kind());
    if let Some(offset) = err.offset() {
        message.push_str(&format!(" at offset {offset:#x}"));
    }
    message.push(')');
    message
}

/// Build an entry filter from an optional glob pattern.
fn entry_filter(filter: Option<&str>) -> Result<impl Fn(&EntryRecord) -> bool> {
    let pattern = filter
        .map(Pattern::new)
        .transpose()
        .context("Invalid filter pattern")?;
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    Ok(move |entry: &EntryRecord| {
        pattern
            .as_ref()
            .map_or(true, |p| p.matches_with(entry.path(), options))
    })
}

fn cmd_list(archive_path: &Path, filter: Option<&str>, detailed: bool, json: bool) -> Result<()> {
    let archive = open_archive(archive_path)?;
    let matches = entry_filter(filter)?;
    let entries: Vec<&EntryRecord> = archive.entries().iter().filter(|&e| matches(e)).collect();

    if json {
        let out = serde_json::to_string_pretty(&entries).context("Failed to serialize entries")?;
        println!("{out}");
        return Ok(());
    }

    for entry in &entries {
        if detailed {
            println!(
                "{:>12} {:>12} {:08x} {}",
                entry.size(),
                entry.offset(),
                entry.key(),
                entry.path()
            );
        } else {
            println!("{}", entry.path());
        }
    }

    println!("\nTotal: {} entries", entries.len());
    if !archive.rejected().is_empty() {
        println!("Skipped: {} invalid entries", archive.rejected().len());
    }

    Ok(())
}

fn cmd_extract(archive_path: &Path, output: &Path, filter: Option<&str>) -> Result<()> {
    println!("Opening archive: {}", archive_path.display());

    let start = Instant::now();
    let archive = open_archive(archive_path)?;

    println!(
        "Loaded {} entries in {:?}",
        archive.entry_count(),
        start.elapsed()
    );

    let matches = entry_filter(filter)?;
    let indices: Vec<usize> = archive
        .entries()
        .iter()
        .enumerate()
        .filter(|&(_, e)| matches(e))
        .map(|(i, _)| i)
        .collect();

    println!("Extracting {} entries...", indices.len());

    let pb = ProgressBar::new(indices.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let start = Instant::now();
    let mut failed = Vec::new();
    archive.extract_parallel(&indices, |_, entry, data| {
        let written = data
            .map_err(anyhow::Error::from)
            .and_then(|data| write_entry(output, entry, &data));
        if let Err(err) = written {
            pb.println(format!("{}: {err:#}", entry.path()));
            failed.push(entry.path().to_string());
        }
        pb.inc(1);
    })?;

    pb.finish_with_message("Done");
    println!("Extraction completed in {:?}", start.elapsed());

    if !failed.is_empty() {
        bail!("{} entries could not be extracted", failed.len());
    }

    Ok(())
}

fn write_entry(output: &Path, entry: &EntryRecord, data: &[u8]) -> Result<()> {
    let output_path = output.join(entry.output_path());
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output_path, data)
        .with_context(|| format!("Failed to write {}", output_path.display()))
}

fn cmd_cat(archive_path: &Path, path: &str, offset: u64, length: Option<u64>) -> Result<()> {
    let archive = open_archive(archive_path)?;
    let mut stream = archive
        .open_file(path)
        .with_context(|| format!("Cannot open {path}"))?
        .into_stream();

    stream.seek(SeekFrom::Start(offset))?;
    let mut reader = stream.take(length.unwrap_or(u64::MAX));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut reader, &mut out).context("Failed to write to stdout")?;
    out.flush()?;

    Ok(())
}

fn cmd_ls(archive_path: &Path, path: &str) -> Result<()> {
    let archive = open_archive(archive_path)?;

    match archive.resolve(path).with_context(|| format!("Cannot list {path}"))? {
        Resolved::Directory(dir) => {
            for (name, kind) in dir.children() {
                match kind {
                    NodeKind::Directory => println!("{name}/"),
                    NodeKind::File => println!("{name}"),
                }
            }
        }
        Resolved::File(file) => {
            println!("{:>12} {}", file.size(), file.entry().path());
        }
    }

    Ok(())
}

fn cmd_info(archive_path: &Path) -> Result<()> {
    let archive = open_archive(archive_path)?;
    let version = archive.version();

    println!("Archive:     {}", archive.name());
    println!("Format:      {:?} (.{})", version, version.extension());
    println!("Header size: {} bytes", version.header_size());
    println!("File size:   {} bytes", archive.byte_len());
    println!("Entries:     {}", archive.entry_count());
    println!("Content:     {} bytes", archive.total_size());
    println!("Skipped:     {}", archive.rejected().len());

    for rejected in archive.rejected() {
        println!("  #{} {}: {}", rejected.index, rejected.name, rejected.error);
    }

    Ok(())
}
