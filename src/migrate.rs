//! Stored data version bookkeeping

use serde_json::json;
use tracing::info;

use crate::storage::{OptionStore, StorageResult};

pub const VERSION_OPTION: &str = "vn_version";

/// Record the running crate version. Returns the previously stored version,
/// if any, so callers can run upgrades between the two.
pub async fn check_versions(options: &dyn OptionStore) -> StorageResult<Option<String>> {
    let current = env!("CARGO_PKG_VERSION");
    let previous = options
        .get_option(VERSION_OPTION)
        .await?
        .and_then(|value| value.as_str().map(str::to_string));

    if previous.as_deref() != Some(current) {
        options.set_option(VERSION_OPTION, json!(current)).await?;
        match &previous {
            Some(old) => info!(from = %old, to = current, "Stored data version updated"),
            None => info!(version = current, "Stored data version initialised"),
        }
    }

    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_version_written_once() {
        let store = MemoryStore::new();

        assert_eq!(check_versions(&store).await.unwrap(), None);
        assert_eq!(store.write_count(), 1);

        let previous = check_versions(&store).await.unwrap();
        assert_eq!(previous.as_deref(), Some(env!("CARGO_PKG_VERSION")));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_old_version_is_replaced() {
        let store = MemoryStore::new();
        store.set_option(VERSION_OPTION, json!("0.0.1")).await.unwrap();

        let previous = check_versions(&store).await.unwrap();
        assert_eq!(previous.as_deref(), Some("0.0.1"));
        assert_eq!(
            store.get_option(VERSION_OPTION).await.unwrap(),
            Some(json!(env!("CARGO_PKG_VERSION")))
        );
    }
}
