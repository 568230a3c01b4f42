use clap::{ArgAction, Parser};
use std::io;

use keyman::commands::{Defaults, HELP, OperationMode, Resolver};
use keyman::error::ExecError;
use keyman::ops::Executor;
use keyman::prompt::TerminalPrompter;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), about = env!("CARGO_PKG_DESCRIPTION"), version = env!("CARGO_PKG_VERSION"), after_help = HELP)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Operation flags and inputs
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    args: Vec<String>,
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("keyman={level},warn")));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(io::stderr).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (session, unrecognized) = Resolver::resolve(&cli.args, Defaults::from_env());
    for token in &unrecognized {
        eprintln!("Invalid argument: {token}");
    }
    if session.mode == OperationMode::None {
        println!("Usage: {} [OPTIONS] [ARGS]...\n\n{HELP}", env!("CARGO_PKG_NAME"));
        return Ok(());
    }
    tracing::debug!(?session, "resolved");

    let mut prompter = TerminalPrompter;
    let mut executor = Executor::new(session, &mut prompter, io::stdout(), io::stderr());
    match executor.execute() {
        Ok(()) => Ok(()),
        Err(ExecError::WalletMissing) => std::process::exit(1),
        Err(e) => Err(e.into()),
    }
}
