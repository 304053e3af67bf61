//! Host-side companion to the Moto bootloader: builds UF2 files for the drive and reads back the
//! ones it serves.

mod image;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use eyre::{Result, WrapErr};
use moto_common::FlashTarget;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::image::{Segment, Summary};

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Command::Pack {
            target,
            elf,
            family,
            input,
            output,
        } => {
            let bytes = read(&input)?;
            let segments = if elf {
                image::elf_segments(&bytes)?
            } else {
                vec![Segment {
                    address: FlashTarget::from(target).region().base_address,
                    data: bytes,
                }]
            };
            let uf2 = image::pack(target.into(), &segments, family)?;
            write(&output, &uf2)?;
            tracing::info!(
                blocks = uf2.len() / 512,
                output = %output.display(),
                "wrote UF2"
            );
        }
        Command::Unpack {
            input,
            output,
            target,
        } => {
            let uf2 = read(&input)?;
            let (target, flat) = image::unpack(&uf2, target.map(Into::into))?;
            write(&output, &flat)?;
            tracing::info!(%target, bytes = flat.len(), output = %output.display(), "wrote image");
        }
        Command::Info { input } => {
            let uf2 = read(&input)?;
            print_summary(&input, &image::summarize(&uf2)?);
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Increase log verbosity; repeat for more. `RUST_LOG` overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a raw binary or an ELF into a UF2 file for one of the flash regions.
    Pack {
        #[arg(short, long, value_enum)]
        target: Target,
        /// Read the input as an ELF and take its loadable segments at their load addresses.
        #[arg(long)]
        elf: bool,
        /// Family ID to stamp on every block, decimal or 0x-prefixed hex.
        #[arg(long, value_parser = clap_num::maybe_hex::<u32>)]
        family: Option<u32>,
        input: PathBuf,
        #[arg(short, required = true)]
        output: PathBuf,
    },
    /// Flatten a UF2 file (e.g. a copy of CURRENT.UF2) back into a region image.
    Unpack {
        input: PathBuf,
        #[arg(short, required = true)]
        output: PathBuf,
        /// Region to extract; defaults to the region of the first flashable block.
        #[arg(short, long, value_enum)]
        target: Option<Target>,
    },
    /// Print block counts, address ranges and a payload checksum.
    Info { input: PathBuf },
}

#[derive(Copy, Clone, ValueEnum)]
enum Target {
    /// MCU flash, above the bootloader.
    Firmware,
    /// External SPI NOR.
    Data,
}

impl From<Target> for FlashTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Firmware => FlashTarget::Firmware,
            Target::Data => FlashTarget::Data,
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).wrap_err_with(|| format!("reading {}", path.display()))
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).wrap_err_with(|| format!("writing {}", path.display()))
}

fn print_summary(path: &Path, summary: &Summary) {
    println!("{}:", path.display());
    println!("  blocks:        {}", summary.blocks);
    println!("  flashable:     {}", summary.flashable);
    println!("  not for flash: {}", summary.not_main_flash);
    if summary.bad_magic > 0 {
        println!("  bad magic:     {}", summary.bad_magic);
    }
    if let Some(count) = summary.declared_count {
        println!("  block count:   {count}");
    }
    if !summary.missing.is_empty() {
        println!("  missing:       {:?}", summary.missing);
    }
    for family in &summary.families {
        println!("  family id:     {family:#010x}");
    }
    if let Some((low, high)) = summary.address_range {
        println!("  addresses:     {low:#010x}..{high:#010x}");
    }
    for (target, pages) in &summary.per_target {
        println!("  {target:<13} {pages} pages");
    }
    if summary.outside > 0 {
        println!("  outside:       {} blocks match no region", summary.outside);
    }
    println!("  payload:       {} bytes, crc32 {:08x}", summary.payload_bytes, summary.crc32);
}
