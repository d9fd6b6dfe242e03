//! docpress - PDF compression service
//!
//! Runs the HTTP compression service, or compresses a single document locally
//! through the same pipeline.

mod display;
mod json_output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use display::{
    create_spinner, display_compression_stats, display_info, display_pipeline_error,
    display_success, display_warning,
};
use docpress_config::{Config, ConfigLoader, LoggingConfig};
use docpress_engine::{CompressionPipeline, EngineLocator};
use docpress_server::HttpServer;
use docpress_types::{CallerIdentity, CompressionRequest, QualityTier, RequestId};
use json_output::{CompressErrorJson, CompressResultJson};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// docpress - PDF compression service
#[derive(Parser)]
#[command(
    name = "docpress",
    version = env!("CARGO_PKG_VERSION"),
    about = "PDF compression service backed by Ghostscript",
    long_about = "docpress compresses PDF documents with Ghostscript.\n\
                  It serves a multipart HTTP endpoint with tiered limits and usage\n\
                  recording, and can compress single files from the command line."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP compression service
    Serve {
        /// Address to listen on, overrides server.bind_addr
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Compress a single PDF
    Compress {
        /// Input PDF
        input: PathBuf,
        /// Output path, defaults to compressed-<name> next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Quality preset: screen, ebook, printer or prepress
        #[arg(short, long, default_value = "ebook")]
        quality: String,
        /// User id to look up entitlements for
        #[arg(long)]
        user: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Locate the Ghostscript executable
    Engine,
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
        /// Write a default configuration file
        #[arg(long, value_name = "PATH")]
        generate: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = ConfigLoader::load(cli.config.as_deref())
        .with_context(|| match &cli.config {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to load configuration".to_string(),
        })?;

    let _guard = init_logging(&config.logging, cli.debug, cli.quiet, cli.verbose)?;

    info!("docpress v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { bind } => {
            serve_command(config, bind).await?;
        }
        Commands::Compress {
            input,
            output,
            quality,
            user,
            json,
        } => {
            return compress_command(config, input, output, &quality, user, json, cli.quiet).await;
        }
        Commands::Engine => {
            return engine_command(&config).await;
        }
        Commands::Config { default, generate } => {
            config_command(&config, default, generate)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(
    logging: &LoggingConfig,
    debug: bool,
    quiet: bool,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let (file_layer, guard) = match &logging.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .context("logging.log_file must name a file")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = logging
        .json_format
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!logging.json_format).then(|| {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

async fn serve_command(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }
    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind_addr))?;

    info!("Starting docpress server");
    info!("Route: {}", config.server.route);
    info!(
        "Engine slots: {}, timeout: {}s",
        config.engine.max_concurrent_invocations, config.engine.invocation_timeout_secs
    );

    let server = HttpServer::from_config(&config);
    server.run(addr, shutdown_signal()).await?;

    info!("docpress server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map_or_else(|| "document.pdf".into(), |name| name.to_string_lossy());
    input.with_file_name(format!("compressed-{}", name))
}

async fn compress_command(
    config: Config,
    input: PathBuf,
    output: Option<PathBuf>,
    quality: &str,
    user: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<ExitCode> {
    let tier: QualityTier = quality.parse()?;
    let payload = tokio::fs::read(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let output = output.unwrap_or_else(|| default_output_path(&input));

    info!("Compressing {} with {} preset", input.display(), tier);

    if !quiet && !json {
        println!(
            "{} Compressing {} ({})",
            style("→").green().bold(),
            style(input.display()).cyan(),
            style(tier).cyan()
        );
    }

    let mut request = CompressionRequest::new(payload).with_tier(tier);
    if let Some(name) = input.file_name() {
        request = request.with_file_name(name.to_string_lossy());
    }
    if let Some(user) = user {
        request = request.with_caller(CallerIdentity::client_asserted(user));
    }

    let pipeline = CompressionPipeline::from_config(config);
    let request_id = RequestId::new();
    let spinner = create_spinner("Running Ghostscript...", quiet || json);
    let started = Instant::now();

    let outcome = pipeline.process_with_id(request_id, request).await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(error) => {
            if json {
                let report = CompressErrorJson::new(
                    input.display().to_string(),
                    request_id.to_string(),
                    &error,
                );
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                display_pipeline_error(&error);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    tokio::fs::write(&output, outcome.result.output())
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    let elapsed = started.elapsed();

    if json {
        let report = CompressResultJson::new(
            input.display().to_string(),
            output.display().to_string(),
            &outcome,
            elapsed.as_secs_f64(),
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        display_compression_stats(&outcome, &output, elapsed);
    }

    info!("Compression completed: {}", output.display());
    Ok(ExitCode::SUCCESS)
}

async fn engine_command(config: &Config) -> Result<ExitCode> {
    let locator = EngineLocator::from_config(&config.engine);

    println!("{} Engine candidates:", style("🔍").blue().bold());
    for candidate in locator.candidates() {
        println!("  {}", style(candidate).dim());
    }
    println!();

    match locator.locate().await {
        Ok(path) => {
            display_success(&format!("Ghostscript found at {}", path.display()));
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            display_pipeline_error(&error);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn config_command(config: &Config, default: bool, generate: Option<PathBuf>) -> Result<()> {
    if let Some(path) = generate {
        if path.exists() {
            display_warning(&format!("Overwriting {}", path.display()));
        }
        ConfigLoader::generate_default_config(&path)?;
        display_success(&format!("Default configuration written to {}", path.display()));
        return Ok(());
    }

    if default {
        println!("{} Default configuration:", style("⚙").blue().bold());
        print!("{}", ConfigLoader::to_yaml(&Config::default())?);
    } else {
        println!("{} Current configuration:", style("⚙").blue().bold());
        match ConfigLoader::config_exists() {
            Some(path) => display_info(&format!("Loaded from {}", path.display())),
            None => display_info("No configuration file found, using defaults"),
        }
        print!("{}", ConfigLoader::to_yaml(config)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compress_arguments() {
        let cli = Cli::try_parse_from([
            "docpress", "compress", "report.pdf", "-q", "printer", "--user", "alice", "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Compress {
                input,
                quality,
                user,
                json,
                output,
            } => {
                assert_eq!(input, PathBuf::from("report.pdf"));
                assert_eq!(quality, "printer");
                assert_eq!(user.as_deref(), Some("alice"));
                assert!(json);
                assert!(output.is_none());
            }
            _ => panic!("expected compress command"),
        }
    }

    #[test]
    fn test_serve_bind_override() {
        let cli = Cli::try_parse_from(["docpress", "--debug", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Serve { bind: Some(ref addr) } if addr == "0.0.0.0:8080"));
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/docs/report.pdf")),
            PathBuf::from("/tmp/docs/compressed-report.pdf")
        );
        assert_eq!(
            default_output_path(Path::new("scan.pdf")),
            PathBuf::from("compressed-scan.pdf")
        );
    }
}
