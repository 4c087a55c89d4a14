// src/main.rs
//
// =============================================================================
// ODLC: COMMAND-LINE DRIVER
// =============================================================================
//
// A thin wrapper around `odlc::compile`: load a `.odl.yaml` file, run the
// pipeline, and render either the IR or a batched diagnostic. Owns process
// exit codes and stdout/stderr; nothing else. Not invoked by library code.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use odlc::{compile, yaml, OdlError};

#[derive(Parser)]
#[command(name = "odlc", version, about = "Organizational Definition Language compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file and print the resulting IR.
    Compile {
        /// Path to a `.odl.yaml` source file.
        path: PathBuf,

        /// Output rendering for a successful compilation.
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Compile a source file and report success/failure only (for CI).
    Check {
        /// Path to a `.odl.yaml` source file.
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile { path, format } => run_compile(&path, format),
        Commands::Check { path } => run_check(&path),
    }
}

fn run_compile(path: &PathBuf, format: OutputFormat) -> Result<()> {
    let started = Instant::now();
    log::info!("compiling '{}'", path.display());

    let source = yaml::load_source(path).with_context(|| format!("loading '{}'", path.display()))?;

    match compile(&source) {
        Ok(ir) => {
            log::info!("compiled '{}' in {:?}", path.display(), started.elapsed());
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&ir)?);
                }
                OutputFormat::Pretty => print_ir_tree(&ir, 0),
            }
            Ok(())
        }
        Err(err) => {
            log::warn!("compilation of '{}' failed after {:?}", path.display(), started.elapsed());
            report_error(&err);
            std::process::exit(1);
        }
    }
}

fn run_check(path: &PathBuf) -> Result<()> {
    let started = Instant::now();
    let source = yaml::load_source(path).with_context(|| format!("loading '{}'", path.display()))?;

    match compile(&source) {
        Ok(_) => {
            log::info!("'{}' is valid ({:?})", path.display(), started.elapsed());
            println!("OK: {}", path.display());
            Ok(())
        }
        Err(err) => {
            report_error(&err);
            std::process::exit(1);
        }
    }
}

fn report_error(err: &OdlError) {
    match err {
        OdlError::Compile(errors) => eprint!("{errors}"),
        other => eprintln!("{other}"),
    }
}

fn print_ir_tree(node: &odlc::IrNode, depth: usize) {
    let indent = "  ".repeat(depth);
    match &node.wiring.output {
        Some(output) => println!("{indent}{} [{}] -> {output}", node.opcode, node.stack_path),
        None => println!("{indent}{} [{}]", node.opcode, node.stack_path),
    }
    for child in &node.children {
        print_ir_tree(child, depth + 1);
    }
}
