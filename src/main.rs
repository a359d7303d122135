//! qflash - Host tool for the quad-SPI NOR flash programming algorithm
//!
//! Drives the same session and algorithm entry points a target-resident
//! download algorithm exposes, against an emulated W25Q64JV whose contents
//! live in a backing image file.
//!
//! # Architecture
//!
//! - `qflash-core` holds the protocol engine, the [`FlashSession`] and the
//!   integer-only [`FlashAlgo`] boundary a debug probe calls
//! - `qflash-emu` provides the emulated controller and flash
//!
//! Each command runs one phase: `main` brings the session up for the
//! matching function code, runs the command and tears the session down so
//! the flash is left memory-mapped. `download` runs every phase itself.

mod cli;
mod commands;
mod config;
mod progress;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Session;
use config::HostConfig;
use progress::ProgressObserver;
use qflash_core::algo::FlashAlgo;
use qflash_core::flash::{FlashSession, Function};
use qflash_emu::{EmuConfig, EmulatedW25q};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match &cli.config {
        Some(path) => {
            let config = HostConfig::from_toml_file(path)?;
            log::info!("Loaded configuration from {:?}", path);
            config
        }
        None => HostConfig::default(),
    }
    .with_overrides(cli.base, cli.clock);

    let emu_config = EmuConfig {
        geometry: config.session.geometry,
        ..EmuConfig::default()
    };
    let mut flash = EmulatedW25q::load_image(emu_config, &cli.image)?;
    log::debug!("Backing image {:?}", cli.image);

    let result = run_command(&mut flash, &config, cli.command);

    // Whatever reached the flash stays there, even after a failure
    flash.save_image(&cli.image)?;
    result
}

fn run_command(
    flash: &mut EmulatedW25q,
    config: &HostConfig,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Info => with_session(flash, config, Function::Verify, commands::run_info),
        Commands::Erase {
            chip,
            start,
            length,
        } => with_session(flash, config, Function::Erase, |session| {
            commands::run_erase(session, chip, start, length)
        }),
        Commands::Program {
            input,
            offset,
            no_erase,
            verify,
        } => with_session(flash, config, Function::Program, |session| {
            commands::run_program(session, &input, offset, !no_erase, verify)
        }),
        Commands::Verify { input, offset } => {
            with_session(flash, config, Function::Verify, |session| {
                commands::run_verify(session, &input, offset)
            })
        }
        Commands::BlankCheck {
            start,
            length,
            pattern,
        } => with_session(flash, config, Function::Verify, |session| {
            commands::run_blank_check(session, start, length, pattern)
        }),
        Commands::Read {
            output,
            start,
            length,
        } => with_session(flash, config, Function::Verify, |session| {
            commands::run_read(session, &output, start, length)
        }),
        Commands::Download {
            input,
            offset,
            chip_erase,
        } => {
            let session =
                FlashSession::with_observer(flash, config.session, ProgressObserver::new())?;
            let mut algo = FlashAlgo::from_session(session);
            commands::run_download(
                &mut algo,
                config.base_address,
                config.clock_hz,
                &input,
                offset,
                chip_erase,
            )
        }
    }
}

/// Run `f` inside one Init/UnInit phase
fn with_session<'f, F>(
    flash: &'f mut EmulatedW25q,
    config: &HostConfig,
    function: Function,
    f: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut Session<&'f mut EmulatedW25q>) -> Result<(), Box<dyn std::error::Error>>,
{
    let mut session = FlashSession::with_observer(flash, config.session, ProgressObserver::new())?;
    session.init(config.base_address, config.clock_hz, function)?;
    f(&mut session)?;
    session.uninit(function)?;
    Ok(())
}
