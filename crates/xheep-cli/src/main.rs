//! `xheep`: command-line runner for X-HEEP tile firmware.
//!
//! ```text
//! USAGE:
//!   xheep run <hello|cnn> --firmware <elf>   Load, boot and check one firmware image
//!   xheep image --firmware <elf> --out <bin> Write the flattened firmware image
//!   xheep layout                             Print the shared memory map
//!   xheep enumerate                          List X-HEEP tiles
//! ```
//!
//! `run` exits with the number of failed result checks (0 = pass) and with
//! status 1 on any fatal error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use xheep_driver::tile::{memmap, regs, soc_ctrl};
use xheep_driver::{
    firmware, parse_u32, Application, BackendSelection, DeviceManager, FirmwareImage,
    FirmwareSource, HelloProgram, Outcome, ResultBlock, SeizureCnnProgram, Session, TileConfig,
    TileProgram,
};

#[derive(Parser)]
#[command(name = "xheep", about = "X-HEEP tile firmware runner for ESP", version)]
struct Cli {
    /// More logging (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Load firmware into the tile, boot it and check its results.
    Run {
        /// Firmware variant; decides which results are read.
        app: App,
        #[command(flatten)]
        firmware: FirmwareArgs,
        /// Tile device node (default /dev/xheep_rtl.0, or $XHEEP_DEVICE).
        #[arg(long)]
        device: Option<PathBuf>,
        /// Contiguous allocator node (default /dev/contig_alloc, or $XHEEP_CONTIG_DEVICE).
        #[arg(long)]
        contig: Option<PathBuf>,
        /// Backend: auto, kernel or software (default auto, or $XHEEP_BACKEND).
        #[arg(long)]
        backend: Option<BackendSelection>,
        /// Prediction reported by the simulated CNN.
        #[arg(long, default_value_t = 1)]
        sim_prediction: u32,
        /// Cycle count reported by the simulated CNN.
        #[arg(long, default_value_t = 1234)]
        sim_cycles: u32,
        /// FC1 outputs reported by the simulated CNN.
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_values_t = [5, -3])]
        sim_fc1: Vec<i32>,
    },
    /// Write the flattened firmware image to a file.
    Image {
        #[command(flatten)]
        firmware: FirmwareArgs,
        /// Output file.
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Print the host/tile shared memory map and register offsets.
    Layout,
    /// List X-HEEP tiles found under /dev.
    Enumerate,
}

#[derive(clap::Args)]
struct FirmwareArgs {
    /// Firmware ELF (or flat binary with --raw-addr).
    #[arg(long)]
    firmware: PathBuf,
    /// Treat --firmware as a flat binary placed at this tile address.
    #[arg(long, value_parser = parse_hex)]
    raw_addr: Option<u32>,
    /// Physical address ELF segments are linked at (default 0, or $XHEEP_LOAD_BASE).
    #[arg(long, value_parser = parse_hex)]
    load_base: Option<u32>,
}

impl FirmwareArgs {
    fn source(&self) -> FirmwareSource {
        match self.raw_addr {
            Some(addr) => FirmwareSource::Raw {
                path: self.firmware.clone(),
                addr,
            },
            None => FirmwareSource::Elf(self.firmware.clone()),
        }
    }

    fn load(&self, config: &TileConfig) -> Result<Vec<xheep_driver::Section>> {
        let load_base = self.load_base.unwrap_or(config.load_base);
        firmware::load(&self.source(), load_base)
            .with_context(|| format!("loading firmware {}", self.firmware.display()))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum App {
    /// Greeting written to the shared message region.
    Hello,
    /// Seizure-detection CNN writing the result block.
    Cnn,
}

impl From<App> for Application {
    fn from(app: App) -> Self {
        match app {
            App::Hello => Self::Hello,
            App::Cnn => Self::SeizureCnn,
        }
    }
}

fn parse_hex(value: &str) -> std::result::Result<u32, String> {
    parse_u32(value).ok_or_else(|| format!("'{value}' is not a 32-bit number"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let config = TileConfig::from_env();
    tracing::debug!("Configuration: {config:?}");

    match cli.command {
        Cmd::Run {
            app,
            firmware,
            device,
            contig,
            backend,
            sim_prediction,
            sim_cycles,
            sim_fc1,
        } => {
            let mut config = config;
            if let Some(device) = device {
                config.device_path = device;
            }
            if let Some(contig) = contig {
                config.contig_path = contig;
            }
            if let Some(backend) = backend {
                config.backend = backend;
            }

            let program: Box<dyn TileProgram> = match app {
                App::Hello => Box::new(HelloProgram::default()),
                App::Cnn => Box::new(SeizureCnnProgram::new(ResultBlock {
                    prediction: sim_prediction,
                    cycles: sim_cycles,
                    fc1_out: [
                        sim_fc1.first().copied().unwrap_or_default(),
                        sim_fc1.get(1).copied().unwrap_or_default(),
                    ],
                })),
            };

            let code = cmd_run(app.into(), &firmware, &config, program)?;
            std::process::exit(code);
        }
        Cmd::Image { firmware, out } => cmd_image(&firmware, &out, &config)?,
        Cmd::Layout => cmd_layout(),
        Cmd::Enumerate => cmd_enumerate()?,
    }

    Ok(())
}

fn cmd_run(
    application: Application,
    firmware: &FirmwareArgs,
    config: &TileConfig,
    program: Box<dyn TileProgram>,
) -> Result<i32> {
    println!("=== X-HEEP {application} ===");

    let sections = firmware.load(config)?;
    let outcome = Session::new(application)
        .run_configured(config, &sections, program)
        .with_context(|| format!("{application} run failed"))?;

    print_outcome(&outcome);
    Ok(outcome.exit_code())
}

fn print_outcome(outcome: &Outcome) {
    println!("Backend        : {}", outcome.backend);
    println!(
        "Firmware       : {} bytes ({} words)",
        outcome.firmware_size,
        outcome.firmware_size / 4
    );
    for warning in &outcome.warnings {
        println!("  [WARN] {warning}");
    }
    println!("Result         : {}", outcome.evaluation);
    println!("Raw results    :");
    print!("{}", outcome.hex_dump());
    for timing in outcome.timings.timings() {
        println!("  {timing}");
    }
    println!("  total: {} ns", outcome.timings.total().as_nanos());

    if outcome.passed() {
        println!("Test PASSED");
    } else {
        println!("Test FAILED: {} error(s)", outcome.soft_errors);
    }
}

fn cmd_image(firmware: &FirmwareArgs, out: &Path, config: &TileConfig) -> Result<()> {
    let sections = firmware.load(config)?;
    let image = FirmwareImage::assemble(&sections).context("assembling firmware image")?;

    for warning in image.warnings() {
        println!("[WARN] {warning}");
    }
    std::fs::write(out, image.as_bytes())
        .with_context(|| format!("writing {}", out.display()))?;

    println!(
        "{} sections -> {} ({} bytes, {} words)",
        sections.len(),
        out.display(),
        image.len(),
        image.len() / 4
    );
    Ok(())
}

fn cmd_layout() {
    println!("Shared window (offsets from the output buffer base):");
    println!("  {:#07x}  firmware entry point", memmap::FW_ENTRY_POINT);
    println!(
        "  {:#07x}  message region ({} bytes)",
        memmap::SHARED_STR_OFFSET,
        memmap::SHARED_STR_MAX
    );
    println!(
        "  {:#07x}  result block ({} words: prediction, cycles, fc1_out[0..2])",
        memmap::SHARED_RES_OFFSET,
        memmap::SHARED_RES_WORDS
    );
    println!("  {:#07x}  soc_ctrl mirror", memmap::SOC_CTRL_WRITE_OFFSET);
    println!();
    println!("Output buffer sizes:");
    for app in [Application::Hello, Application::SeizureCnn] {
        println!("  {:<12} {:#07x}", app.to_string(), app.output_buffer_size());
    }
    println!();
    println!("Accelerator registers:");
    println!("  {:#04x}  SRC_OFFSET", regs::SRC_OFFSET);
    println!("  {:#04x}  DST_OFFSET", regs::DST_OFFSET);
    println!("  {:#04x}  CODE_SIZE_WORDS", regs::CODE_SIZE_WORDS);
    println!("  {:#04x}  BOOT_FETCH_CODE_ADDR", regs::BOOT_FETCH_CODE_ADDR);
    println!("  {:#04x}  BOOT_FETCH_CODE", regs::BOOT_FETCH_CODE);
    println!("  {:#04x}  BOOT_EXIT_LOOP", regs::BOOT_EXIT_LOOP);
    println!();
    println!("soc_ctrl registers (written by firmware, offset / window address):");
    for (name, offset, addr) in [
        ("BOOT_SELECT", soc_ctrl::BOOT_SELECT, memmap::BOOT_SELECT_ADDR),
        ("BOOT_EXIT_LOOP", soc_ctrl::BOOT_EXIT_LOOP, memmap::BOOT_EXIT_LOOP_ADDR),
        ("BOOT_ADDRESS", soc_ctrl::BOOT_ADDRESS, memmap::BOOT_ADDRESS_ADDR),
    ] {
        println!("  {offset:#04x}  {addr:#07x}  {name}");
    }
    println!("  {:#04x}           SYSTEM_FREQUENCY_HZ", soc_ctrl::SYSTEM_FREQUENCY_HZ);
}

fn cmd_enumerate() -> Result<()> {
    let mgr = DeviceManager::discover()?;

    println!("X-HEEP tiles: {}", mgr.device_count());
    for info in mgr.devices() {
        println!("[{}] {}", info.index, info.path().display());
    }

    Ok(())
}
