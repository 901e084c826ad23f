//! CLI argument definitions for the fitsync binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Session and identity tooling for the fitness planner backend
#[derive(Parser, Debug)]
#[command(name = "fitsync")]
#[command(about = "fitsync: drive and inspect the planner's session engine")]
#[command(version)]
pub struct Cli {
    /// Print JSON instead of aligned text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mount the engine and print every identity change until Ctrl-C
    Watch(WatchArgs),
    /// Complete an email or provider redirect
    Callback(CallbackArgs),
    /// Sign in with email and password
    SignIn(SignInArgs),
    /// Sign out and clear the local profile cache
    SignOut(SignOutArgs),
    /// Request a password-reset email
    ResetPassword(ResetPasswordArgs),
}

/// Connection settings shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct BackendArgs {
    /// Base URL of the auth API
    #[arg(long, env = "FITSYNC_AUTH_URL")]
    pub auth_url: String,

    /// Base URL of the REST API serving the profile table
    #[arg(long, env = "FITSYNC_REST_URL")]
    pub rest_url: String,

    /// Project API key
    #[arg(long, env = "FITSYNC_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Name of the profile table
    #[arg(long, default_value = "profiles", env = "FITSYNC_PROFILE_TABLE")]
    pub profile_table: String,

    /// Data directory for the stored session and the profile cache
    #[arg(short = 'D', long, env = "FITSYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// How long a password sign-in waits for the profile, in milliseconds
    #[arg(
        long,
        default_value_t = fitsync::constants::DEFAULT_SIGN_IN_TIMEOUT_MS,
        env = "FITSYNC_SIGN_IN_TIMEOUT_MS"
    )]
    pub sign_in_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(clap::Args, Debug)]
pub struct CallbackArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// The full URL the redirect landed on
    pub url: String,

    /// Absolute bound on the whole flow, in milliseconds
    #[arg(
        long,
        default_value_t = fitsync::constants::DEFAULT_REDIRECT_TIMEOUT_MS,
        env = "FITSYNC_REDIRECT_TIMEOUT_MS"
    )]
    pub timeout_ms: u64,

    /// Destination on failure or timeout
    #[arg(long, default_value = "/login")]
    pub sign_in_path: String,

    /// Destination on success
    #[arg(long, default_value = "/")]
    pub home_path: String,

    /// Destination after a password-recovery link
    #[arg(long, default_value = "/reset-password")]
    pub recovery_path: String,
}

#[derive(clap::Args, Debug)]
pub struct SignInArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Account email
    #[arg(short, long)]
    pub email: String,

    /// Account password
    #[arg(long, env = "FITSYNC_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(clap::Args, Debug)]
pub struct SignOutArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(clap::Args, Debug)]
pub struct ResetPasswordArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Account email
    #[arg(short, long)]
    pub email: String,

    /// Where the emailed link should land
    #[arg(long)]
    pub redirect_to: Option<String>,
}
