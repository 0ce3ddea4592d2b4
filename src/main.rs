//! machdump - recover decrypted Mach-O executables from process memory.
//!
//! Host entry point: maps a memory-dump file as the in-memory image view and
//! drives the dump pipeline against the on-disk binary.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memmap2::Mmap;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use machdump::{dump_image, encryption_commands, LoadedImage, MemoryImage};

/// Recover decrypted Mach-O executables from process memory dumps.
#[derive(Parser, Debug)]
#[command(name = "machdump")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Patch an on-disk binary with the plaintext from a memory dump
    Patch {
        /// The on-disk (encrypted) binary, thin or fat
        binary: PathBuf,

        /// File holding the decrypted in-memory image, starting at its
        /// Mach-O header
        dump: PathBuf,

        /// Output path (default: <binary file name>.decrypted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base address the image was loaded at (hex, diagnostics only)
        #[arg(short, long)]
        base: Option<String>,

        /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
        #[arg(short, long, default_value = "1")]
        verbosity: u8,
    },

    /// List the encryption descriptors of a thin image or memory dump
    Info {
        /// A thin Mach-O binary or memory dump
        image: PathBuf,

        /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
        #[arg(short, long, default_value = "1")]
        verbosity: u8,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Patch {
            binary,
            dump,
            output,
            base,
            verbosity,
        } => {
            setup_logging(verbosity);
            cmd_patch(binary, dump, output, base)
        }
        Commands::Info { image, verbosity } => {
            setup_logging(verbosity);
            cmd_info(image)
        }
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Parses a hex address string such as "0x100000000".
fn parse_address(address: &str) -> Result<u64> {
    let digits = address.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid address: {}", address))
}

/// Maps a file read-only.
fn map_file(path: &Path) -> Result<Mmap> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("failed to memory map {}", path.display()))?;
    Ok(mmap)
}

fn cmd_patch(
    binary: PathBuf,
    dump: PathBuf,
    output: Option<PathBuf>,
    base: Option<String>,
) -> Result<()> {
    let start = Instant::now();

    let base = match base {
        Some(ref addr) => parse_address(addr)?,
        None => 0,
    };

    let mmap = map_file(&dump)?;
    let memory = MemoryImage::new(base, &mmap)
        .with_context(|| format!("{} is not a memory image of a Mach-O binary", dump.display()))?;

    let output_path = output.unwrap_or_else(|| {
        let name = binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        PathBuf::from(format!("{}.decrypted", name))
    });

    let image = LoadedImage {
        path: Some(binary),
        memory,
    };

    let stats = dump_image(&image, &output_path)
        .with_context(|| format!("failed to dump to {}", output_path.display()))?;

    let elapsed = start.elapsed();
    info!("{} in {:.2}s", stats, elapsed.as_secs_f64());
    println!("{}", output_path.display());
    Ok(())
}

fn cmd_info(path: PathBuf) -> Result<()> {
    let mmap = map_file(&path)?;
    let image = MemoryImage::new(0, &mmap).with_context(|| {
        format!(
            "{} is not a thin Mach-O image (fat containers carry one slice per \
             architecture; pass a single slice or a memory dump)",
            path.display()
        )
    })?;

    println!("Image:        {}", path.display());
    println!("Architecture: {}", image.header().arch_name());
    println!("Commands:     {}", image.header().ncmds());

    let mut found = 0usize;
    for descriptor in encryption_commands(&image) {
        found += 1;
        println!(
            "  [{}] range {:#x}..{:#x} ({} bytes), system id {}{}",
            found,
            descriptor.cryptoff,
            descriptor.cryptoff as u64 + descriptor.cryptsize as u64,
            descriptor.cryptsize,
            descriptor.cryptid,
            if descriptor.cryptid == 0 {
                " (not encrypted)"
            } else {
                ""
            }
        );
    }

    if found == 0 {
        println!("No encryption descriptors");
    }

    Ok(())
}
