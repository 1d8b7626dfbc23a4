use clap::{Parser, ValueEnum};
use codespan_reporting::term::termcolor::ColorChoice;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Generate fixed-layout accessors for `[[noserde]]` structs
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Source file containing `[[noserde]]` structs
    #[clap(long = "in", name = "INPUT", display_order = 0)]
    input: PathBuf,
    /// Where to write the generated header
    #[clap(long = "out", name = "OUTPUT", display_order = 1)]
    output: PathBuf,
    /// Fail instead of writing if the output is missing or out of date
    #[clap(long = "check")]
    check: bool,
    /// When to use colours in diagnostics
    #[clap(long = "color", value_enum, default_value_t = Color::Auto)]
    color: Color,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Color {
    Auto,
    Always,
    Never,
}

/// Filter for internal tracing, written to stderr.
const LOG_ENV_VAR: &str = "NOSERDE_LOG";

fn install_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ! {
    let cli = Cli::parse();
    install_tracing();

    let mut driver = noserde_gen::Driver::new();
    driver.install_panic_hook();
    match cli.color {
        Color::Auto => {}
        Color::Always => driver.set_color_choice(ColorChoice::Always),
        Color::Never => driver.set_color_choice(ColorChoice::Never),
    }

    let status = if cli.check {
        driver.check(&cli.input, &cli.output)
    } else {
        driver.generate(&cli.input, &cli.output)
    };

    std::process::exit(status.exit_code());
}
