use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;

use attributor::config::{StaticConfig, get_config, init_config_from};
use attributor::runtime::modes;
use attributor::system::init_logging;

#[derive(Debug, Parser)]
#[command(name = "attributor", version, about = "Click attribution and conversion postback service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = attributor::config::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Run one dispatch retry pass and exit
    RetryOnce,
    /// Print a sample configuration file
    GenerateConfig {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn generate_config(output: Option<String>) -> anyhow::Result<()> {
    let sample = StaticConfig::generate_sample_config();
    match output {
        Some(path) => {
            std::fs::write(&path, sample)?;
            println!("{} {}", "Sample configuration written to".green(), path);
        }
        None => print!("{}", sample),
    }
    Ok(())
}

#[actix_web::main]
async fn main() {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let command = cli.command.unwrap_or(Command::Serve);
    let run_retry_once = match command {
        Command::GenerateConfig { output } => {
            if let Err(e) = generate_config(output) {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                process::exit(1);
            }
            return;
        }
        Command::RetryOnce => true,
        Command::Serve => false,
    };

    init_config_from(&cli.config);
    let config = get_config();

    // guard 需要存活到进程结束
    let _log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", "Failed to initialize logging:".red().bold(), e);
            process::exit(1);
        }
    };

    let result = if run_retry_once {
        modes::run_retry_once().await
    } else {
        modes::run_server().await
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
