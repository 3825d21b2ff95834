//! Streamzip CLI - list and extract ZIP archives from files or stdin.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use streamzip::{Pipe, Source, ZipStreamReader};

/// Streamzip - streaming ZIP archive reader
#[derive(Parser)]
#[command(name = "streamzip")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of an archive
    List {
        /// Path to the archive, or `-` for stdin
        #[arg(short, long, env = "INPUT_ZIP")]
        input: String,

        /// Show sizes and modification times
        #[arg(short, long)]
        detailed: bool,
    },

    /// Extract an archive into a directory
    Extract {
        /// Path to the archive, or `-` for stdin
        #[arg(short, long, env = "INPUT_ZIP")]
        input: String,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List { input, detailed } => {
            cmd_list(&input, detailed)?;
        }
        Commands::Extract { input, output } => {
            cmd_extract(&input, &output)?;
        }
    }

    Ok(())
}

fn open_source(input: &str) -> Result<Box<dyn Source>> {
    if input == "-" {
        Ok(Box::new(Pipe(io::stdin())))
    } else {
        let file = File::open(input).with_context(|| format!("Failed to open {input}"))?;
        Ok(Box::new(file))
    }
}

fn cmd_list(input: &str, detailed: bool) -> Result<()> {
    let mut archive = ZipStreamReader::new(open_source(input)?);

    let mut count = 0;
    while let Some(entry) = archive.next_entry().context("Failed to read entry")? {
        if detailed {
            let mtime = entry
                .last_modified()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            println!("{:>12} {:>12} {}", entry.size(), mtime, entry.name());
        } else {
            println!("{}", entry.name());
        }
        count += 1;
        entry.close().context("Failed to skip entry")?;
    }

    println!("\nTotal: {} entries", count);

    Ok(())
}

fn cmd_extract(input: &str, output: &Path) -> Result<()> {
    let mut archive = ZipStreamReader::new(open_source(input)?);

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {pos} {wide_msg}")?);

    let start = Instant::now();
    let mut count = 0u64;
    while let Some(mut entry) = archive.next_entry().context("Failed to read entry")? {
        let Some(relative) = sanitize_name(entry.name()) else {
            pb.suspend(|| println!("skipping unsafe path: {}", entry.name()));
            entry.close()?;
            continue;
        };
        let target = output.join(&relative);

        pb.set_message(entry.name().to_string());
        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            entry.close()?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            io::copy(&mut entry, &mut out)
                .with_context(|| format!("Failed to extract {}", entry.name()))?;
            entry.close()?;
            count += 1;
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    println!("Extracted {} files in {:?}", count, start.elapsed());

    Ok(())
}

/// Reduce an entry name to a safe relative path: forward slashes only, no
/// root, no drive prefix, no `..` components.
fn sanitize_name(name: &str) -> Option<PathBuf> {
    let name = name.replace('\\', "/");
    let mut path = PathBuf::new();
    for component in Path::new(&name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => return None,
        }
    }
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name_accepts_nested_paths() {
        assert_eq!(
            sanitize_name("a/b/c.txt"),
            Some(PathBuf::from("a/b/c.txt"))
        );
        assert_eq!(
            sanitize_name("dir\\file.bin"),
            Some(PathBuf::from("dir/file.bin"))
        );
    }

    #[test]
    fn test_sanitize_name_rejects_escapes() {
        assert_eq!(sanitize_name("../evil"), None);
        assert_eq!(sanitize_name("/etc/passwd"), None);
        assert_eq!(sanitize_name("a/../../b"), None);
        assert_eq!(sanitize_name(""), None);
    }
}
