/*++

Licensed under the Apache-2.0 license.

File Name:

    main.rs

Abstract:

    Command-line front end for the AXI CDMA and capability-parser drivers.

--*/

mod platform;
mod selftest;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use dma_config::DmaConfig;
use log::LevelFilter;
use platform::Platform;
use simple_logger::SimpleLogger;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Board configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against emulated hardware instead of UIO devices
    #[arg(long, default_value_t = false)]
    emulate: bool,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a 0xDEADBEEF pattern with the CDMA and verify the destination
    Memcpy {
        /// Bytes to copy
        #[arg(long, value_parser = maybe_hex::<usize>, default_value = "0x18")]
        size: usize,

        /// Use simple mode even when scatter-gather is available
        #[arg(long, default_value_t = false)]
        simple: bool,
    },
    /// Parse a generated capability map and print the valid entries
    KcapParse {
        /// Number of valid entries to place in the map
        #[arg(long, default_value_t = 100)]
        caps: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    SimpleLogger::new().with_level(args.log_level).init()?;

    let config = match &args.config {
        Some(path) => DmaConfig::load(path)?,
        None => DmaConfig::default(),
    };
    let force_simple = matches!(args.command, Commands::Memcpy { simple: true, .. });
    let platform = if args.emulate {
        Platform::emulated(&config, force_simple)?
    } else {
        Platform::hardware(&config, force_simple)?
    };

    match args.command {
        Commands::Memcpy { size, .. } => {
            let Some(cdma) = platform.cdma.as_ref() else {
                anyhow::bail!("no [cdma] section in the configuration");
            };
            selftest::memcpy(cdma, platform.memory.as_ref(), size)
        }
        Commands::KcapParse { caps } => {
            let Some(kcap) = platform.kcap.as_ref() else {
                anyhow::bail!("no [kcap] section in the configuration");
            };
            selftest::kcap_parse(kcap, platform.memory.as_ref(), caps)
        }
    }
}
