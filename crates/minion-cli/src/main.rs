//! Minion CLI - run build commands and navigate their diagnostics.

mod colors;
mod diagnostics;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "minion")]
#[command(about = "Run build commands and extract compiler diagnostics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a build command and print the diagnostics it produced
    Run {
        /// Command and arguments (after `--`)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,

        /// Build config file (JSON) supplying cmd, working_dir and options
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Working directory (default: current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Regex with groups (file, line, column, message) for diagnostics
        #[arg(long)]
        file_regex: Option<String>,

        /// Drop output lines starting with a match of this regex (repeatable)
        #[arg(long = "ignore")]
        ignore: Vec<String>,

        /// Show all output, ignoring --ignore patterns
        #[arg(long)]
        all_output: bool,

        /// Extra environment variable for the build, as KEY=VALUE (repeatable)
        #[arg(short, long = "env", value_parser = parse_env)]
        env: Vec<(String, String)>,

        /// Engine tuning file (JSON)
        #[arg(long)]
        engine_config: Option<PathBuf>,

        /// Print diagnostics as JSON on stdout (build output goes to stderr)
        #[arg(long)]
        json: bool,
    },

    /// Extract diagnostics from saved build output
    Diagnostics {
        /// Output file to read (default: stdin)
        file: Option<PathBuf>,

        /// Directory relative paths are resolved against (default: current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Regex with groups (file, line, column, message)
        #[arg(long)]
        file_regex: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_env(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{value}`")),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format minion-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(minion_err) = err.downcast_ref::<minion_core::Error>() {
            anyhow::anyhow!("{}", minion_err.with_hint())
        } else {
            err
        }
    };

    let code = match cli.command {
        Commands::Run {
            cmd,
            config,
            dir,
            file_regex,
            ignore,
            all_output,
            env,
            engine_config,
            json,
        } => {
            let args = run::RunArgs {
                cmd,
                config,
                dir,
                file_regex,
                ignore,
                all_output,
                env,
                engine_config,
                json,
            };
            run::execute(args).map_err(format_error)?
        }

        Commands::Diagnostics {
            file,
            dir,
            file_regex,
            json,
        } => {
            diagnostics::execute(file.as_deref(), dir, file_regex.as_deref(), json)
                .map_err(format_error)?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
