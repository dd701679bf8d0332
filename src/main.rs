//! Main entry point for the `a3d` CLI application.
//!
//! Lists, summarizes and extracts `.a3d`/`.a3z` containers from the local
//! filesystem or from HTTP URLs.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use a3d_archive::open::{LoadMode, load_location};
use a3d_archive::{Archive, CentralDirectoryEntry, Cli, ReaderConfig, sanitize};

/// Application entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = ReaderConfig::from_env()?;
    let mut archive = Archive::new(config);

    let mode = load_location(&mut archive, &cli.file, !cli.no_fallback)
        .await
        .with_context(|| format!("cannot open {}", cli.file))?;

    let result = process_archive(&mut archive, &cli).await;

    // Display network transfer statistics for range-read sources
    if mode == LoadMode::RemoteRange && !cli.is_quiet() {
        if let Some(transferred) = archive.transferred_bytes() {
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    }

    archive.dispose();
    result
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Dispatch on CLI mode: summary, listing, or extraction.
async fn process_archive(archive: &mut Archive, cli: &Cli) -> Result<()> {
    if cli.info {
        return show_info(archive).await;
    }

    if cli.list || cli.verbose {
        return list_files(archive, cli.verbose);
    }

    let entries: Vec<CentralDirectoryEntry> = archive
        .central_directory()
        .map(|index| index.entries().cloned().collect())
        .unwrap_or_default();

    // Apply filters to determine which entries to extract:
    // 1. Skip directories (they are created automatically during extraction)
    // 2. If specific entries are requested, only include matching ones
    // 3. Exclude entries matching the exclusion patterns
    let to_extract: Vec<_> = entries
        .iter()
        .filter(|e| !e.is_directory)
        .filter(|e| {
            cli.files.is_empty()
                || cli.files.iter().any(|f| {
                    if has_glob_chars(f) {
                        glob_match(f, &e.name)
                    } else {
                        e.name == *f || base_name(&e.name) == f.as_str()
                    }
                })
        })
        .filter(|e| {
            !cli
                .exclude
                .iter()
                .any(|x| e.name.contains(x.as_str()) || glob_match(x, &e.name))
        })
        .collect();

    let multiple_files = cli.pipe && to_extract.len() > 1;
    let mut failures = 0usize;
    for entry in to_extract {
        // One bad entry does not stop the others
        if let Err(err) = extract_file(archive, entry, cli, multiple_files).await {
            failures += 1;
            if !cli.is_very_quiet() {
                eprintln!("error: {}: {:#}", entry.name, err);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} entries could not be extracted");
    }
    Ok(())
}

/// Print the manifest summary and content availability.
async fn show_info(archive: &mut Archive) -> Result<()> {
    let manifest = archive.parse_manifest().await?.clone();

    println!("Container version: {}", manifest.container_version);
    if let Some(packer) = &manifest.packer {
        println!(
            "Packer:            {} {}",
            packer,
            manifest.packer_version.as_deref().unwrap_or("")
        );
    }
    if let Some(date) = &manifest.creation_date {
        println!("Created:           {date}");
    }
    if let Some(annotations) = &manifest.annotations {
        println!("Annotations:       {}", annotations.len());
    }

    println!("\nData entries:");
    for (key, entry) in &manifest.data_entries {
        let file_name = entry.file_name.as_deref().unwrap_or("-");
        let shown = match sanitize(file_name) {
            Ok(clean) => clean,
            Err(reason) => format!("[rejected: {reason}]"),
        };
        let lod = if entry.is_proxy() { "  (proxy)" } else { "" };
        println!("  {key:<16} {shown}{lod}");
    }

    println!("\nContent:");
    println!("{}", serde_json::to_string_pretty(&archive.content_info())?);
    Ok(())
}

/// List entries in the container.
///
/// Supports two output formats:
/// - Simple format (`-l`): Just entry names, one per line
/// - Verbose format (`-v`): Detailed table with size, compression ratio, and timestamps
fn list_files(archive: &Archive, verbose: bool) -> Result<()> {
    let Some(index) = archive.central_directory() else {
        anyhow::bail!("archive not loaded");
    };

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    // Track totals for summary line
    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in index.entries() {
        // Names are untrusted: only ever print the sanitized form
        let name = match sanitize(&entry.name) {
            Ok(clean) => clean,
            Err(reason) => format!("[rejected: {reason}]"),
        };

        if verbose {
            let (year, month, day) = entry.mod_date();
            let (hour, minute, _second) = entry.mod_time();

            let ratio = format!(
                "{:>4}%",
                savings_percent(entry.compressed_size, entry.uncompressed_size)
            );

            println!(
                "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio,
                year,
                month,
                day,
                hour,
                minute,
                name
            );

            if !entry.is_directory {
                total_uncompressed = total_uncompressed.saturating_add(entry.uncompressed_size);
                total_compressed = total_compressed.saturating_add(entry.compressed_size);
                file_count += 1;
            }
        } else {
            println!("{name}");
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        let total_ratio = format!(
            "{:>4}%",
            savings_percent(total_compressed, total_uncompressed)
        );
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed, total_compressed, total_ratio, "", file_count
        );
    }

    Ok(())
}

/// Extract a single entry from the container.
///
/// The output path is built from the sanitized name only, so a hostile
/// entry name cannot escape the extraction directory.
async fn extract_file(
    archive: &Archive,
    entry: &CentralDirectoryEntry,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    let safe_name = match sanitize(&entry.name) {
        Ok(name) => name,
        Err(reason) => {
            warn!(name = %entry.name, %reason, "refusing unsafe entry name");
            anyhow::bail!("unsafe entry name: {reason}");
        }
    };

    let Some(file) = archive.extract_file(&entry.name).await? else {
        return Ok(());
    };

    // Pipe mode: write entry contents directly to stdout
    if cli.pipe {
        let mut stdout = tokio::io::stdout();
        if show_filename {
            stdout
                .write_all(format!("--- {} ---\n", safe_name).as_bytes())
                .await?;
        }
        stdout.write_all(&file.data).await?;
        stdout.flush().await?;
        return Ok(());
    }

    let relative = if cli.junk_paths {
        base_name(&safe_name).to_string()
    } else {
        safe_name.clone()
    };
    let output_path = match &cli.extract_dir {
        Some(dir) => PathBuf::from(dir).join(&relative),
        None => PathBuf::from(&relative),
    };

    // Handle existing files based on overwrite options
    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", safe_name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", safe_name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", safe_name);
    }

    write_output(&output_path, &file.data).await
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let mut out = fs::File::create(path).await?;
    out.write_all(data).await?;
    out.flush().await?;
    Ok(())
}

/// Percentage of space saved by compression; sizes come from untrusted headers.
fn savings_percent(compressed: u64, uncompressed: u64) -> i64 {
    if uncompressed == 0 {
        return 0;
    }
    let kept = u128::from(compressed) * 100 / u128::from(uncompressed);
    100 - i64::try_from(kept).unwrap_or(i64::MAX - 100)
}

fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star matches zero characters, or one and stays for more
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
