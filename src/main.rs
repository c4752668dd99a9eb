//! Go Service Generator - Command-line tool for documenting Go services.
//!
//! Reads the annotated service interfaces of one Go package, resolves every
//! type they reference across the module, its vendor directory and the module
//! cache, and writes an OpenAPI 3.0 document.
//!
//! # Usage
//!
//! ```bash
//! go-service-gen [OPTIONS] <SERVICES_PATH>
//! ```
//!
//! # Examples
//!
//! Generate YAML documentation next to the services:
//! ```bash
//! go-service-gen ./pkg/service
//! ```
//!
//! Generate JSON and dump the resolved model:
//! ```bash
//! go-service-gen ./pkg/service -o api/swagger.json --model api/model.json
//! ```

use anyhow::Result;
use clap::Parser;
use go_service_gen::cli;
use log::info;

fn main() -> Result<()> {
    // Parse once for the verbose flag, validate after the logger is up
    let args_for_verbose = cli::CliArgs::parse();

    let log_level = if args_for_verbose.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("Go Service Generator starting...");

    let args = cli::parse_args_from_parsed(args_for_verbose)?;
    cli::run(args)?;

    info!("OpenAPI document generation completed successfully");

    Ok(())
}
