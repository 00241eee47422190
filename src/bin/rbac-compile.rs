use anyhow::{Context, Result};
use clap::Parser;
use route_rbac::{Evaluator, Role, compile_file, write_artifact};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Compile API security annotations into a permission artifact.
///
/// The artifact format follows the output extension: `.rs` writes a Rust
/// module, anything else writes JSON.
#[derive(Debug, Parser)]
#[command(name = "rbac-compile", version, about)]
struct Cli {
    /// API document (YAML, or JSON with a `.json` extension).
    input: PathBuf,

    /// Artifact to write; parent directories are created.
    output: PathBuf,

    /// Print the accessible routes of a role after compiling.
    #[arg(long = "summary", value_name = "ROLE")]
    summaries: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let table = compile_file(&cli.input)
        .with_context(|| format!("failed to compile {}", cli.input.display()))?;
    let format = write_artifact(&table, &cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    info!(
        input = %cli.input.display(),
        output = %cli.output.display(),
        rows = table.len(),
        roles = table.roles().roles().len(),
        tags = table.tags().count(),
        ?format,
        "permission table generated"
    );

    if !cli.summaries.is_empty() {
        let evaluator = Evaluator::new(Arc::new(table));
        for name in &cli.summaries {
            let role = match evaluator.table().roles().parse(name) {
                Some(role) => role,
                None => {
                    warn!(role = %name, "role is not declared by the document");
                    Role::new(name).with_context(|| format!("invalid role {name:?}"))?
                }
            };
            print!("{}", evaluator.permission_summary(&role));
        }
    }

    Ok(())
}
