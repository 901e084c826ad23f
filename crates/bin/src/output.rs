//! Output formatting helpers for human-readable and JSON output.

use fitsync::{DerivedIdentity, callback::CallbackOutcome};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Print a table with aligned columns in human-readable format.
///
/// `headers` and each row in `rows` must have the same length.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let col_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let render = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(headers.to_vec()));
    for row in rows {
        println!(
            "{}",
            render(row.iter().take(col_count).map(String::as_str).collect())
        );
    }
}

/// Key/value rows describing an identity.
pub fn identity_rows(identity: &DerivedIdentity) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    match &identity.user {
        Some(user) => {
            rows.push(vec!["user".to_string(), user.id.clone()]);
            if let Some(email) = &user.email {
                rows.push(vec!["email".to_string(), email.clone()]);
            }
            if let Some(name) = user.display_name() {
                rows.push(vec!["name".to_string(), name]);
            }
            let role = user.role().map_or("unknown", |r| r.as_str());
            rows.push(vec!["role".to_string(), role.to_string()]);
            if let Some(trainer) = user.trainer_id() {
                rows.push(vec!["trainer".to_string(), trainer.to_string()]);
            }
        }
        None => rows.push(vec!["user".to_string(), "(signed out)".to_string()]),
    }
    rows.push(vec![
        "privileged".to_string(),
        identity.is_privileged.to_string(),
    ]);
    if identity.loading {
        rows.push(vec!["loading".to_string(), "true".to_string()]);
    }
    if let Some(error) = &identity.error {
        rows.push(vec!["error".to_string(), error.clone()]);
    }
    rows
}

/// Print one identity snapshot.
pub fn print_identity(
    identity: &DerivedIdentity,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Human => print_table(&["FIELD", "VALUE"], &identity_rows(identity)),
        OutputFormat::Json => println!("{}", serde_json::to_string(identity)?),
    }
    Ok(())
}

/// Print the result of a redirect callback.
pub fn print_callback(
    outcome: &CallbackOutcome,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = match &outcome.result {
        Ok(_) => "ok".to_string(),
        Err(e) => e.to_string(),
    };
    let user_id = outcome.session().map(|s| s.user_id.clone());
    let elapsed_ms = outcome.elapsed.as_millis() as u64;

    match format {
        OutputFormat::Human => {
            let mut rows = vec![vec!["status".to_string(), status]];
            if let Some(user_id) = user_id {
                rows.push(vec!["user".to_string(), user_id]);
            }
            rows.push(vec![
                "destination".to_string(),
                outcome
                    .destination
                    .clone()
                    .unwrap_or_else(|| "(none)".to_string()),
            ]);
            rows.push(vec!["url".to_string(), outcome.sanitized_url.clone()]);
            rows.push(vec!["elapsed".to_string(), format!("{elapsed_ms}ms")]);
            print_table(&["FIELD", "VALUE"], &rows);
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "success": outcome.is_success(),
                "status": status,
                "user_id": user_id,
                "destination": outcome.destination,
                "sanitized_url": outcome.sanitized_url,
                "elapsed_ms": elapsed_ms,
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}
