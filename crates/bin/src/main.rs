use clap::Parser;
use tracing_subscriber::EnvFilter;

mod backend;
mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use output::OutputFormat;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays parseable with --json
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fitsync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match &cli.command {
        Commands::Watch(args) => commands::watch::run(args, format).await,
        Commands::Callback(args) => commands::callback::run(args, format).await,
        Commands::SignIn(args) => commands::sign_in::run(args, format).await,
        Commands::SignOut(args) => commands::sign_out::run(args, format).await,
        Commands::ResetPassword(args) => commands::reset_password::run(args, format).await,
    }
}
