//! Reset-password command - asks the backend to email a recovery link.

use crate::backend::connect;
use crate::cli::ResetPasswordArgs;
use crate::output::OutputFormat;

/// Run the reset-password command
pub async fn run(
    args: &ResetPasswordArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = connect(&args.backend).await?;
    let result = connection
        .engine
        .reset_password_for_email(&args.email, args.redirect_to.as_deref())
        .await;
    connection.close().await?;
    result?;

    match format {
        OutputFormat::Human => println!("Recovery email requested for {}", args.email),
        OutputFormat::Json => {
            let value = serde_json::json!({ "requested": true, "email": args.email });
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}
