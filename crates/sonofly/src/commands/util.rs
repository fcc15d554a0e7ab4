//! Shared helpers for command handlers.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use sonofly_core::{Account, CoreError, Hub, SetupOutcome};

use crate::error::CliError;

/// Set up `accounts`, then wait up to `wait` for their background
/// bootstraps. Returns the first rejected login, if any.
pub async fn bring_online(
    hub: &Hub,
    accounts: Vec<Account>,
    wait: Duration,
) -> Result<Option<CoreError>, CliError> {
    let mut ids = Vec::with_capacity(accounts.len());
    let mut rejected = None;

    for account in accounts {
        let id = account.id();
        match hub.setup_account(account).await? {
            SetupOutcome::Ready => {}
            SetupOutcome::Retryable(e) => {
                warn!(account = %id, error = %e, "cloud unavailable, continuing without it");
            }
            SetupOutcome::Fatal(e) => {
                rejected.get_or_insert(e);
            }
        }
        ids.push(id);
    }

    let joined = async {
        for id in &ids {
            hub.join_bootstrap(id).await;
        }
    };
    if tokio::time::timeout(wait, joined).await.is_err() {
        warn!(?wait, "account setup still running");
    }
    Ok(rejected)
}

/// Parse a `key=value` parameter. The value is taken as JSON when it
/// parses, as a plain string otherwise.
pub fn parse_param(raw: &str) -> Result<(String, Value), CliError> {
    let (key, value) = raw.split_once('=').ok_or_else(|| CliError::Validation {
        field: "param".into(),
        reason: format!("expected KEY=VALUE, got '{raw}'"),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "param".into(),
            reason: format!("empty key in '{raw}'"),
        });
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}
