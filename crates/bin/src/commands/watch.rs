//! Watch command - prints every published identity until interrupted.

use fitsync::engine::EngineNotice;
use tokio::sync::broadcast::error::RecvError;

use crate::backend::connect;
use crate::cli::WatchArgs;
use crate::output::{OutputFormat, print_identity};

/// Run the watch command
pub async fn run(args: &WatchArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let connection = connect(&args.backend).await?;
    let engine = connection.engine.clone();
    let mut identity = engine.subscribe();
    let mut notices = engine.notices();

    if format == OutputFormat::Human {
        eprintln!("Watching identity changes, press Ctrl+C to stop");
    }
    print_identity(&identity.borrow_and_update(), format)?;

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    loop {
        tokio::select! {
            _ = &mut interrupted => {
                tracing::info!("Interrupted, unmounting engine");
                break;
            }
            changed = identity.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = identity.borrow_and_update().clone();
                if format == OutputFormat::Human {
                    println!();
                }
                print_identity(&current, format)?;
            }
            notice = notices.recv() => match notice {
                Ok(EngineNotice::InvalidAccount { user_id }) => {
                    tracing::warn!(user_id = %user_id, "Account has no profile and was signed out");
                }
                Ok(notice) => tracing::debug!(?notice, "Engine notice"),
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "Missed engine notices"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    connection.close().await
}
