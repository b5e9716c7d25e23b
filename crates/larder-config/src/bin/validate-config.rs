//! Config validation CLI tool
//!
//! Validates a larder configuration file and reports any errors.

use larder_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a larder configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match larder_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", larder_config::CURRENT_CONFIG_VERSION);
            println!("  Data directory: {}", settings.service.data_dir.display());
            println!(
                "  Max concurrent fetches: {}",
                settings.service.max_concurrent_fetches
            );
            println!(
                "  Channel-specific databases: {} ({} override(s))",
                settings.service.channel_specific,
                settings.channel_overrides.len()
            );
            println!("  Resources: {}", settings.resources.len());

            if !settings.resources.is_empty() {
                println!();
                println!("Resources:");
                for resource in &settings.resources {
                    println!(
                        "  - {} every {}s: {}",
                        resource.name,
                        resource.refresh_interval.as_secs(),
                        resource.url
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                larder_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                larder_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                larder_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                larder_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        larder_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
