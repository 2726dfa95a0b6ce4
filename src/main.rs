use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use covmap::cli::{self, ArmStyle};
use covmap::remap::RemapConfig;
use covmap::resolve::{MapMode, Resolver};

/// covmap — Remap Istanbul coverage data onto original sources via source maps.
#[derive(Parser)]
#[command(name = "covmap", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remap a coverage report from generated-file coordinates to original
    /// source coordinates.
    Transform {
        /// Path to the coverage JSON. Reads stdin if omitted.
        input: Option<PathBuf>,

        /// Output path. Writes stdout if omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Source map resolution mode (embedded, adjacent, dir, auto).
        #[arg(long)]
        maps: Option<String>,

        /// Directory of `<file>.map` files, for the `dir` mode.
        #[arg(long)]
        map_dir: Option<PathBuf>,

        /// What to do with branch arms that fail to remap.
        #[arg(long, value_enum, default_value = "keep")]
        unmapped_arms: ArmStyle,

        /// Pretty-print the output JSON.
        #[arg(long)]
        pretty: bool,
    },

    /// Decode a source map file and print a summary of its mappings.
    Inspect {
        /// Path to the `.map` file.
        map: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Transform {
            input,
            output,
            maps,
            map_dir,
            unmapped_arms,
            pretty,
        } => cmd_transform(input, output, maps, map_dir, unmapped_arms, pretty),
        Commands::Inspect { map } => {
            let text = std::fs::read_to_string(&map)
                .with_context(|| format!("Failed to read {}", map.display()))?;
            print!("{}", cli::cmd_inspect(&text)?);
            Ok(())
        }
    }
}

fn cmd_transform(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    maps: Option<String>,
    map_dir: Option<PathBuf>,
    unmapped_arms: ArmStyle,
    pretty: bool,
) -> Result<()> {
    let data = match &input {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read coverage from stdin")?;
            buf
        }
    };

    let mode: MapMode = match maps.as_deref() {
        Some(s) => s.parse()?,
        None => MapMode::default(),
    };
    let resolver = Resolver::new(mode, map_dir);
    let config = RemapConfig {
        unmapped_arms: unmapped_arms.into(),
    };

    let (json, diagnostics) = cli::cmd_transform(&data, &resolver, config, pretty)?;

    for diagnostic in &diagnostics {
        warn!("{diagnostic}");
    }

    match &output {
        Some(path) => std::fs::write(path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(())
}
