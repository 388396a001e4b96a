//! fin REPL entry point.
//!
//! ```bash
//! cargo run -p fin-repl -- --config ./fin.toml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "fin", version, about = "Interactive shell over a fin kernel")]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/fin/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the computer name
    #[arg(short, long)]
    name: Option<String>,

    /// Do not load or save line history
    #[arg(long)]
    no_history: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean (respects RUST_LOG)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("fin_kernel=info".parse()?)
                .add_directive("fin_repl=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = fin_repl::load_config(args.config.as_deref())?;
    if let Some(name) = args.name {
        config.kernel.name = name;
    }
    if args.no_history {
        config.history = false;
    }

    fin_repl::run(config)
}
