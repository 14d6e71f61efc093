//! jobdesc: validate and expand CI build descriptors

// Panic reports bypass tracing and go straight to stderr
#![allow(clippy::print_stderr)]

mod cli;
mod commands;
mod tracing;

use crate::tracing::{TracingConfig, TracingFormat};

fn main() -> miette::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    crate::tracing::init_tracing(TracingConfig {
        format: if cli.json {
            TracingFormat::Json
        } else {
            TracingFormat::Compact
        },
        level: cli.level.into(),
        ..Default::default()
    })?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::execute(cli.command, &mut out)
}
