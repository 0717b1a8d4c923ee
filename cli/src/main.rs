//! Binary entry point for masque.
//!
//! Drives the anonymization hooks from the command line: anonymize and
//! restore text, feed trusted documents to the allowlist and manage it.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use masque_core::AnonymizerConfig;
use masque_privacy::{deanonymize, Document, PlaceholderMapping, PrivacyHooks, SessionState};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// Masque - reversible PII anonymization.
#[derive(Parser)]
#[command(name = "masque")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (entity text included).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "MASQUE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Anonymize text and print the result.
    Anonymize {
        /// Input file (stdin when omitted).
        file: Option<PathBuf>,

        /// Write the placeholder mapping as JSON to this file ("-" for stdout).
        #[arg(short, long)]
        mapping: Option<PathBuf>,
    },

    /// Restore placeholders using a saved mapping.
    Restore {
        /// JSON mapping produced by `anonymize --mapping`.
        #[arg(short, long)]
        mapping: PathBuf,

        /// Input file (stdin when omitted).
        file: Option<PathBuf>,
    },

    /// Ingest a trusted document: allowlist its entities and print the
    /// content as it would be stored.
    Ingest {
        /// Source identifier (URL or file name).
        #[arg(short, long)]
        source: Option<String>,

        /// Document file.
        file: PathBuf,
    },

    /// Retract every allowance granted by a source.
    Retract {
        /// Source identifier used at ingestion.
        source: String,
    },

    /// Show whether a text is allowlisted and who vouches for it.
    Allowed {
        /// Exact entity text.
        text: String,
    },

    /// Delete the allowlist database.
    Reset,

    /// Print the effective configuration.
    Config,
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if debug { "info,masque=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AnonymizerConfig::load_with_env(cli.config.as_deref())
        .context("failed to load configuration")?;
    if cli.verbose {
        config.debug_logging = true;
    }
    init_tracing(config.debug_logging);

    info!("Starting masque v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let hooks = PrivacyHooks::from_config(config.clone())
        .await
        .context("failed to initialize anonymizer")?;

    if config.reset_db {
        hooks.apply_settings(config).await?;
        clear_reset_flag(cli.config.as_deref())?;
    }

    match cli.command {
        Commands::Anonymize { file, mapping } => {
            cmd_anonymize(&hooks, file.as_deref(), mapping.as_deref()).await
        }
        Commands::Restore { mapping, file } => cmd_restore(&mapping, file.as_deref()),
        Commands::Ingest { source, file } => cmd_ingest(&hooks, source, &file).await,
        Commands::Retract { source } => {
            let removed = hooks.on_source_removed(&source).await;
            println!("Removed {removed} allowlisted entities");
            Ok(())
        }
        Commands::Allowed { text } => cmd_allowed(&hooks, &text).await,
        Commands::Reset => {
            hooks.anonymizer().allowlist().reset().await?;
            println!("Allowlist reset");
            Ok(())
        }
        Commands::Config => Ok(()),
    }
}

async fn cmd_anonymize(
    hooks: &PrivacyHooks,
    file: Option<&Path>,
    mapping_out: Option<&Path>,
) -> Result<()> {
    let text = read_input(file)?;
    let mut session = SessionState::new();
    let anonymized = hooks.on_user_message(&mut session, &text).await;

    print!("{anonymized}");

    if let Some(out) = mapping_out {
        let json = session.mapping().to_json()?;
        if out == Path::new("-") {
            println!();
            println!("{json}");
        } else {
            std::fs::write(out, json)
                .with_context(|| format!("failed to write mapping to {}", out.display()))?;
        }
    }
    Ok(())
}

fn cmd_restore(mapping_path: &Path, file: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(mapping_path)
        .with_context(|| format!("failed to read mapping {}", mapping_path.display()))?;
    let mapping = PlaceholderMapping::from_json(&raw)
        .with_context(|| format!("invalid mapping {}", mapping_path.display()))?;

    let text = read_input(file)?;
    print!("{}", deanonymize(&text, &mapping));
    Ok(())
}

async fn cmd_ingest(hooks: &PrivacyHooks, source: Option<String>, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let source = source.unwrap_or_else(|| file.display().to_string());

    let before = hooks.anonymizer().allowlist().len();
    let stored = hooks
        .on_document_ingest(Document::new(content, source))
        .await;
    let after = hooks.anonymizer().allowlist().len();

    print!("{}", stored.content);
    eprintln!(
        "Allowlist now holds {after} entities ({} new)",
        after.saturating_sub(before)
    );
    Ok(())
}

async fn cmd_allowed(hooks: &PrivacyHooks, text: &str) -> Result<()> {
    match hooks.anonymizer().allowlist().lookup(text).await? {
        Some(entity) => {
            println!("{} ({})", entity.text, entity.entity_type);
            for source in entity.sources {
                println!("  {source}");
            }
        }
        None => println!("{text}: not allowlisted"),
    }
    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn clear_reset_flag(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => AnonymizerConfig::config_path()?,
    };
    if AnonymizerConfig::clear_reset_flag(&path)? {
        info!("Cleared reset_db in {}", path.display());
    }
    Ok(())
}
