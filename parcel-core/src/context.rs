//! Wiring: config → storage → sessions → HTTP client → API + query cache

use std::sync::Arc;

use crate::api::ParcelApi;
use crate::client::ApiClient;
use crate::config::ParcelConfig;
use crate::error::ParcelError;
use crate::query::QueryClient;
use crate::session::{FileStorage, Sessions, TokenStorage};

/// Everything a front-end needs, built once per process.
#[derive(Debug, Clone)]
pub struct ParcelContext {
    pub config: ParcelConfig,
    pub api: ParcelApi,
    pub queries: QueryClient,
}

impl ParcelContext {
    /// Sessions persisted in the configured session file.
    pub fn from_config(config: ParcelConfig) -> Result<Self, ParcelError> {
        let path = config.storage.resolved_session_path();
        let storage = FileStorage::open(&path)?;
        tracing::info!(path = %path.display(), "Using session file");
        Self::with_storage(config, Arc::new(storage))
    }

    pub fn with_storage(config: ParcelConfig, storage: Arc<dyn TokenStorage>) -> Result<Self, ParcelError> {
        let client = ApiClient::new(&config.api, Sessions::new(storage))?;
        tracing::info!(base_url = client.base_url(), "API client ready");

        let api = ParcelApi::new(client, config.chat.support_admin_id);
        let queries = QueryClient::new(config.query.clone());
        Ok(Self {
            config,
            api,
            queries,
        })
    }

    pub fn sessions(&self) -> &Sessions {
        self.api.client().sessions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStorage;

    #[test]
    fn test_context_uses_configured_base_url() {
        let mut config = ParcelConfig::default();
        config.api.base_url = "http://parcel.test/api/".to_string();
        let ctx = ParcelContext::with_storage(config, Arc::new(MemoryStorage::new())).unwrap();
        assert_eq!(ctx.api.client().base_url(), "http://parcel.test/api");
        assert!(ctx.sessions().admin.token().is_none());
    }

    #[test]
    fn test_context_opens_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ParcelConfig::default();
        config.storage.session_path = dir.path().join("session.json").to_string_lossy().into_owned();

        let ctx = ParcelContext::from_config(config).unwrap();
        ctx.sessions()
            .customer
            .store_login("tok", &serde_json::json!({"id": 1}))
            .unwrap();
        assert!(dir.path().join("session.json").exists());
    }
}
