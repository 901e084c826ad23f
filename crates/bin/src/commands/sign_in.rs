//! Sign-in command - password login followed by profile resolution.

use crate::backend::connect;
use crate::cli::SignInArgs;
use crate::output::{OutputFormat, print_identity};

/// Run the sign-in command
pub async fn run(args: &SignInArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let connection = connect(&args.backend).await?;
    let result = connection
        .engine
        .sign_in_with_password(&args.email, &args.password)
        .await;

    // Persist whatever the engine ended up with, even after a failure
    connection.close().await?;
    let identity = result?;
    print_identity(&identity, format)
}
