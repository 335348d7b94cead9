use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use ua_ast::TransformOptions;
use ua_parser::{emit_module, emit_module_with_source_map, parse_source};
use ua_transform::transform_module;

#[derive(Parser)]
#[command(name = "unawait", about = "unawait: rewrite async functions into promise chains")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite every async function in a file and emit the result.
    Compile {
        /// Input .js/.ts file.
        input: PathBuf,
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON file with transform options.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip the final IIFE inliner.
        #[arg(long)]
        no_inline: bool,
        /// Fail on constructs that cannot be rewritten.
        #[arg(long)]
        strict: bool,
        /// Generate a source map.
        #[arg(long)]
        source_map: bool,
    },
    /// Transform the file without writing anything and report problems.
    Check {
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Parse and dump the AST.
    Parse {
        input: PathBuf,
        /// Dump as JSON instead of debug output.
        #[arg(long)]
        ast: bool,
    },
}

fn load_options(config: Option<&Path>) -> Result<TransformOptions> {
    let Some(path) = config else {
        return Ok(TransformOptions::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let opts = serde_json::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(?opts, "loaded options");
    Ok(opts)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("UNAWAIT_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            input,
            output,
            config,
            no_inline,
            strict,
            source_map,
        } => {
            let mut opts = load_options(config.as_deref())?;
            opts.inline &= !no_inline;
            opts.strict |= strict;

            let source = std::fs::read_to_string(&input)?;
            let filename = input.display().to_string();
            let parsed = parse_source(&source, &filename)?;
            let module = transform_module(parsed.module, &opts)
                .with_context(|| format!("failed to transform {filename}"))?;

            let (code, srcmap) = if source_map {
                let (code, map) = emit_module_with_source_map(&module, parsed.source_map)?;
                (code, Some(map))
            } else {
                (emit_module(&module, parsed.source_map)?, None)
            };

            match &output {
                Some(path) => std::fs::write(path, &code)?,
                None => print!("{code}"),
            }

            if let Some(srcmap) = srcmap {
                let map_path = match &output {
                    Some(path) => format!("{}.map", path.display()),
                    None => format!("{filename}.map"),
                };
                std::fs::write(&map_path, srcmap)?;
                eprintln!("Source map written to {map_path}");
            }
        }
        Commands::Check { input, config } => {
            let opts = load_options(config.as_deref())?;
            let source = std::fs::read_to_string(&input)?;
            let filename = input.display().to_string();
            let parsed = parse_source(&source, &filename)?;
            transform_module(parsed.module, &opts)
                .with_context(|| format!("failed to transform {filename}"))?;
            eprintln!("OK: {filename}");
        }
        Commands::Parse { input, ast } => {
            let source = std::fs::read_to_string(&input)?;
            let filename = input.display().to_string();
            let parsed = parse_source(&source, &filename)?;

            if ast {
                let json = serde_json::to_string_pretty(&parsed.module)?;
                println!("{json}");
            } else {
                println!("{:#?}", parsed.module);
            }
        }
    }

    Ok(())
}
