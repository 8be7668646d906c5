// Paged listing of previously uploaded files

use std::sync::Arc;

use crate::config::ActionConfig;
use crate::error::ApiError;
use crate::file_type;
use crate::state::{BasicState, MultiState, ResponseState, StateCode};
use crate::storage::Storage;

pub struct FileCatalog {
    storage: Arc<dyn Storage>,
}

impl FileCatalog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Lists one page of allowed files under the configured directory.
    ///
    /// `start` outside `0..=total` yields an empty page rather than an error.
    pub async fn list(&self, config: &ActionConfig, start: i64) -> ResponseState {
        let keys = match self.storage.list(&config.list_dir).await {
            Ok(keys) => keys,
            Err(ApiError::DirectoryNotFound(dir)) => {
                tracing::debug!(dir = %dir, "Listing directory does not exist");
                return BasicState::failure(StateCode::NotExist).into();
            }
            Err(ApiError::NotADirectory(dir)) => {
                tracing::warn!(dir = %dir, "Listing path is not a directory");
                return BasicState::failure(StateCode::NotDirectory).into();
            }
            Err(e) => {
                tracing::error!(dir = %config.list_dir, error = %e, "Failed to list files");
                return BasicState::failure(StateCode::IoError).into();
            }
        };

        let matched: Vec<String> = keys
            .into_iter()
            .filter(|key| {
                file_type::extension_of(key)
                    .is_some_and(|ext| file_type::is_allowed(ext, &config.allow_files))
            })
            .collect();

        let total = matched.len();
        let mut state = MultiState::success();

        if let Ok(offset) = usize::try_from(start) {
            if offset <= total {
                let end = offset.saturating_add(config.list_size).min(total);
                for key in &matched[offset..end] {
                    state = state.with_child(&BasicState::success().with_info("url", key.as_str()));
                }
            }
        }

        state.with_info("start", start).with_info("total", total).into()
    }
}
