//! Callback command - completes an auth redirect and reports where to go next.

use std::time::Duration;

use fitsync::callback::{CallbackConfig, CallbackHandler};

use crate::backend::connect;
use crate::cli::CallbackArgs;
use crate::output::{OutputFormat, print_callback, print_identity};

/// Run the callback command
pub async fn run(
    args: &CallbackArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = connect(&args.backend).await?;
    let engine = connection.engine.clone();
    engine.wait_until_initialized().await?;

    let config = CallbackConfig {
        timeout_ms: args.timeout_ms,
        sign_in_path: args.sign_in_path.clone(),
        home_path: args.home_path.clone(),
        recovery_path: args.recovery_path.clone(),
    };
    let handler = CallbackHandler::for_engine(&engine, config);
    let outcome = handler.handle(&args.url).await;
    print_callback(&outcome, format)?;

    if let Some(session) = outcome.session() {
        // Give the engine the rest of the budget to resolve the new user's profile
        let remaining = Duration::from_millis(args.timeout_ms).saturating_sub(outcome.elapsed);
        let user_id = session.user_id.clone();
        let mut identity = engine.subscribe();
        let settled = tokio::time::timeout(
            remaining,
            identity.wait_for(|i| i.user_id() == Some(user_id.as_str()) && !i.loading),
        )
        .await;
        match settled {
            Ok(Ok(current)) => {
                let current = current.clone();
                print_identity(&current, format)?;
            }
            Ok(Err(_)) => tracing::warn!("Engine stopped before the profile resolved"),
            Err(_) => tracing::warn!("Profile did not resolve in time"),
        }
    }

    let failed = !outcome.is_success();
    connection.close().await?;
    if failed {
        return Err("auth callback failed".into());
    }
    Ok(())
}
