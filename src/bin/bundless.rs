//! Bundless CLI
//!
//! Builds every configured target, or shows what a build would do.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use bundless::{BuildConfig, Pipeline, TransformerRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bundless")]
#[command(about = "Transform a source tree file by file, once per target")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the build
    Build {
        /// Config file, layered over the default locations
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Worker threads
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Also write the report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Show every unit with its chain and output path
    Plan {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered transformers
    Transformers,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let registry = TransformerRegistry::with_builtins();

    match cli.command {
        Commands::Build {
            config,
            concurrency,
            report_json,
        } => {
            let config = load_config(config.as_deref())?;
            let mut pipeline = Pipeline::new(&config, &registry);
            if let Some(n) = concurrency {
                pipeline = pipeline.with_concurrency(n);
            }

            let report = pipeline.run();
            print!("{}", report.render());

            if let Some(path) = report_json {
                let json = report.to_json()?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing report to {}", path.display()))?;
                println!("📄 Report written to {}", path.display());
            }

            Ok(report.exit_code())
        }

        Commands::Plan { config, json } => {
            let config = load_config(config.as_deref())?;
            let plan = Pipeline::new(&config, &registry).plan();

            if json {
                println!("{}", serde_json::to_string_pretty(&plan.summaries())?);
            } else {
                for unit in plan.summaries() {
                    let chain = if unit.chain.is_empty() {
                        "(passthrough)".to_string()
                    } else {
                        unit.chain.join(" → ")
                    };
                    println!(
                        "[{}] {} → {}  {}",
                        unit.target,
                        unit.source.display(),
                        unit.output.display(),
                        chain
                    );
                }
            }

            for error in &plan.errors {
                eprintln!("❌ [{}] {}", error.target, error.message);
            }

            Ok(if plan.errors.is_empty() { 0 } else { 1 })
        }

        Commands::Transformers => {
            println!("📦 {} transformer(s)\n", registry.len());
            for descriptor in registry.descriptors() {
                println!("{}", descriptor.id());
                if !descriptor.description().is_empty() {
                    println!("  {}", descriptor.description());
                }
                for (from, to) in descriptor.extension_remap() {
                    println!("  .{} → .{}", from, to);
                }
                match descriptor.schema() {
                    None => println!("  (no options)"),
                    Some(schema) => {
                        for (name, rule) in schema.iter() {
                            let flag = if rule.required { " (required)" } else { "" };
                            let about = rule.description.as_deref().unwrap_or("");
                            println!("  --{}{}  {}", name, flag, about);
                        }
                    }
                }
                println!();
            }
            Ok(0)
        }
    }
}

/// Load config and anchor relative roots at the config file's directory
fn load_config(path: Option<&Path>) -> anyhow::Result<BuildConfig> {
    let mut config = BuildConfig::load_from(path).context("loading configuration")?;

    let base = match path.and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    config.resolve_paths(&base);
    Ok(config)
}
