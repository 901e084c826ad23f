//! Sign-out command.

use crate::backend::connect;
use crate::cli::SignOutArgs;
use crate::output::OutputFormat;

/// Run the sign-out command
pub async fn run(args: &SignOutArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let connection = connect(&args.backend).await?;
    connection.engine.wait_until_initialized().await?;
    let user_id = connection.engine.session().map(|s| s.user_id);
    let result = connection.engine.sign_out().await;
    connection.close().await?;
    result?;

    match format {
        OutputFormat::Human => match &user_id {
            Some(user_id) => println!("Signed out {user_id}"),
            None => println!("No session to sign out"),
        },
        OutputFormat::Json => {
            let value = serde_json::json!({ "signed_out": user_id });
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}
