//! stencil CLI tool.

use clap::{Parser, Subcommand, ValueEnum};
use stencil_config::{OutputFormat, TransformOptions};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Render templated infrastructure documents", long_about = None)]
struct Cli {
    /// Output format
    #[arg(long, global = true, env = "STENCIL_FORMAT", value_enum, default_value = "yaml")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a document
    Render {
        /// Document to render, `-` for stdin
        input: String,
        /// Write the rendered document here instead of stdout
        #[arg(short, long, env = "STENCIL_OUTPUT")]
        output: Option<String>,
        /// Leave out the render metadata block
        #[arg(long, env = "STENCIL_OMIT_METADATA")]
        omit_metadata: bool,
        /// Maximum include, expand and instantiation depth
        #[arg(long, env = "STENCIL_MAX_DEPTH", default_value_t = TransformOptions::DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },
    /// List the imports a document resolves, without evaluating it
    Imports {
        /// Document to inspect, `-` for stdin
        input: String,
        /// Maximum import depth
        #[arg(long, env = "STENCIL_MAX_DEPTH", default_value_t = TransformOptions::DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Yaml => OutputFormat::Yaml,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the document.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format.into();

    match cli.command {
        Commands::Render {
            input,
            output,
            omit_metadata,
            max_depth,
        } => {
            commands::render::run(&input, output.as_deref(), format, omit_metadata, max_depth)
                .await?;
        }
        Commands::Imports { input, max_depth } => {
            commands::imports::run(&input, format, max_depth).await?;
        }
    }

    Ok(())
}
