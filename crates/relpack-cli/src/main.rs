use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod completion;
mod config;
mod dispatch;
mod render;

use completion::CliCompletionShell;
use dispatch::run_cli;
use render::{current_output_style, TerminalRenderer};

const LOG_ENV: &str = "RELPACK_LOG";

#[derive(Parser, Debug)]
#[command(name = "relpack")]
#[command(about = "Build hot-upgrade packages for Erlang/OTP releases", long_about = None)]
struct Cli {
    /// Log debug diagnostics to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Print unadorned output without badges or progress bars.
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build `<name>_<version>.tar.gz` upgrading a deployed release to the new one.
    Build(BuildArgs),
    /// Show the release identities declared by reltool.config and the new tree.
    Inspect {
        reltool_config: PathBuf,
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct BuildArgs {
    reltool_config: PathBuf,
    /// Root of the currently deployed release.
    #[arg(long)]
    previous_release: Option<PathBuf>,
    /// TOML settings file; `./relpack.toml` is read when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Erlang runtime used to drive systools.
    #[arg(long)]
    erl: Option<PathBuf>,
    /// Validate and print the plan without touching the working directory.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let renderer = TerminalRenderer::from_style(current_output_style(cli.plain));
    match run_cli(cli, renderer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            renderer.print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
