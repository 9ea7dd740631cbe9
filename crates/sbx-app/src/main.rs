mod check;
mod config;
mod error;
mod generator;
mod settings;
mod web;
#[cfg(test)]
mod testing;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use sbx_core::{GenerationDefaults, GenerationRequest};
use crate::config::AppConfig;
use crate::generator::Generator;
use crate::generator::backend::ComfyBackend;
use crate::settings::SettingsStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive a local diffusion backend from the shell or the browser")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate one image and print its public path on stdout.
    Generate(GenerateArgs),
    /// Run the web UI.
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Check that the backend is reachable and has the required operations.
    Check {
        /// Backend root URL, overriding COMFYUI_URL.
        url: Option<String>,
    },
    /// Upload an image to the backend's input folder and print its stored name.
    Upload {
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    prompt: String,
    negative_prompt: Option<String>,
    model: Option<String>,
    /// Non-numeric or zero values fall back to the default.
    width: Option<String>,
    height: Option<String>,
    area_id: Option<String>,
}

fn parse_dimension(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse().ok()).filter(|v| *v > 0)
}

/// Writes the public path of the stored image to `out` as its only line.
async fn generate(
    config: &AppConfig,
    defaults: &GenerationDefaults,
    args: GenerateArgs,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let request = GenerationRequest::builder(args.prompt)
        .negative_prompt(args.negative_prompt)
        .model_name(args.model)
        .size(
            parse_dimension(args.width.as_deref()),
            parse_dimension(args.height.as_deref()),
        )
        .area_id(args.area_id)
        .build(defaults)?;

    let artifact = Generator::new(config)?.generate(&request).await?;

    writeln!(out, "{}", artifact.public_path)?;
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;
    let settings_store = SettingsStore::new(&config.settings_path);

    match cli.command {
        Commands::Generate(args) => {
            let defaults = settings_store.load().await?;
            generate(&config, &defaults, args, &mut std::io::stdout()).await
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            let defaults = settings_store.load().await?;
            web::serve(&config, settings_store, defaults).await
        }
        Commands::Check { url } => {
            if let Some(url) = url {
                config.comfyui_url = url;
            }
            let backend = check::connect(&config)?;
            println!("{}", check::run(&backend).await?);
            println!("Backend API is working correctly.");
            Ok(())
        }
        Commands::Upload { file } => {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("{} has no file name", file.display()))?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let uploaded = ComfyBackend::new(&config)?.upload_image(name, bytes).await?;
            tracing::info!(
                "Stored as {} in {} ({})",
                uploaded.name,
                if uploaded.subfolder.is_empty() { "/" } else { uploaded.subfolder.as_str() },
                uploaded.kind.as_deref().unwrap_or("input")
            );
            println!("{}", uploaded.name);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
