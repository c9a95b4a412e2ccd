//! Loads accounts from a JSON seed file into the in-memory store.
//!
//! The file holds an array of accounts. Each entry may carry a
//! `provider_tokens` list alongside the account fields:
//!
//! ```json
//! [{ "id": "1", "user_name": "alice", "roles": ["Admin"],
//!    "provider_tokens": [{ "provider": "github", "user_id": "gh-1" }] }]
//! ```

use keyward_identity::{Account, InMemoryAccountStore, ProviderTokens};
use serde::Deserialize;
use std::path::Path;

use crate::error::ServerError;

#[derive(Debug, Deserialize)]
struct SeedAccount {
    #[serde(flatten)]
    account: Account,
    #[serde(default)]
    provider_tokens: Vec<ProviderTokens>,
}

/// Reads `path` and returns a store holding its accounts.
///
/// # Errors
///
/// Returns `ServerError::Seed` if the file cannot be read or parsed, or if
/// two accounts share a user name.
pub async fn load_accounts(
    path: &Path,
) -> keyward_core::Result<InMemoryAccountStore, ServerError> {
    let seed_error = |details: String| ServerError::Seed {
        path: path.display().to_string(),
        details,
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| seed_error(e.to_string()))?;
    let entries: Vec<SeedAccount> =
        serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))?;

    let store = InMemoryAccountStore::new();
    for entry in entries {
        let id = entry.account.id().clone();
        store
            .insert(entry.account)
            .await
            .map_err(|e| seed_error(e.to_string()))?;
        if !entry.provider_tokens.is_empty() {
            store
                .set_provider_tokens(&id, entry.provider_tokens)
                .await
                .map_err(|e| seed_error(e.to_string()))?;
        }
    }

    tracing::info!(accounts = store.len().await, path = %path.display(), "seeded account store");
    Ok(store)
}
