// Stores multipart and base64 uploads

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use std::sync::Arc;

use crate::config::ActionConfig;
use crate::file_type;
use crate::path_format;
use crate::state::{BasicState, MultiState, ResponseState, StateCode};
use crate::storage::{StoredObject, Storage};

/// Suffix given to base64 payloads, which arrive without a file name.
pub const ENCODED_IMAGE_SUFFIX: &str = ".jpg";

/// One file field of a multipart body.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub field_name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Request body as classified by the transport.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// Not a multipart body.
    #[default]
    Absent,
    /// Declared multipart but could not be parsed.
    Malformed,
    Multipart(Vec<UploadPart>),
}

pub struct Uploader {
    storage: Arc<dyn Storage>,
}

impl Uploader {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Stores every file part of a multipart body.
    ///
    /// All parts are validated before anything is written. A part that fails
    /// to write is reported but does not stop the others. A single part yields
    /// its own basic state; several parts yield a multi state listing each.
    pub async fn store_stream(&self, payload: &Payload, config: &ActionConfig) -> ResponseState {
        let parts = match payload {
            Payload::Absent => return BasicState::failure(StateCode::NotMultipartContent).into(),
            Payload::Malformed => return BasicState::failure(StateCode::ParseRequestError).into(),
            Payload::Multipart(parts) => parts,
        };

        if parts.is_empty() {
            return BasicState::failure(StateCode::NotFoundUploadData).into();
        }

        for part in parts {
            let suffix = file_type::suffix_from_name(&part.file_name);

            if !file_type::is_allowed(&suffix, &config.allow_files) {
                tracing::warn!(file = %part.file_name, "Rejected upload with disallowed type");
                return BasicState::failure(StateCode::NotAllowFileType).into();
            }

            if part.data.len() as u64 > config.max_size {
                tracing::warn!(
                    file = %part.file_name,
                    size = part.data.len(),
                    max_size = config.max_size,
                    "Rejected oversized upload"
                );
                return BasicState::failure(StateCode::MaxSize).into();
            }
        }

        let mut outcomes = Vec::with_capacity(parts.len());

        for part in parts {
            let suffix = file_type::suffix_from_name(&part.file_name);
            let original = file_type::stem_of(&part.file_name);
            let key = destination(&config.save_path, Some(original), &suffix);

            tracing::debug!(
                field = %part.field_name,
                file = %part.file_name,
                content_type = part.content_type.as_deref().unwrap_or("unknown"),
                key = %key,
                "Storing upload"
            );

            let outcome = match self.storage.put(&key, part.data.clone()).await {
                Ok(stored) => stored_state(&stored)
                    .with_info("type", suffix.as_str())
                    .with_info("original", part.file_name.as_str()),
                Err(e) => {
                    tracing::error!(file = %part.file_name, key = %key, error = %e, "Failed to store upload");
                    BasicState::failure(StateCode::IoError)
                }
            };

            outcomes.push(outcome);
        }

        if !outcomes.iter().any(BasicState::is_success) {
            return BasicState::failure(StateCode::IoError).into();
        }

        if outcomes.len() == 1 {
            return outcomes.remove(0).into();
        }

        outcomes
            .iter()
            .fold(MultiState::success(), |state, outcome| state.with_child(outcome))
            .into()
    }

    /// Decodes and stores a base64 payload such as a scrawl.
    pub async fn store_encoded(&self, content: Option<&str>, config: &ActionConfig) -> ResponseState {
        let Some(content) = content.map(str::trim).filter(|c| !c.is_empty()) else {
            return BasicState::failure(StateCode::NotFoundUploadData).into();
        };

        let data = match decode_base64(content) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode base64 upload");
                return BasicState::failure(StateCode::ParseRequestError).into();
            }
        };

        if data.len() as u64 > config.max_size {
            tracing::warn!(size = data.len(), max_size = config.max_size, "Rejected oversized base64 upload");
            return BasicState::failure(StateCode::MaxSize).into();
        }

        let key = destination(&config.save_path, config.file_name.as_deref(), ENCODED_IMAGE_SUFFIX);

        match self.storage.put(&key, Bytes::from(data)).await {
            Ok(stored) => stored_state(&stored)
                .with_info("type", ENCODED_IMAGE_SUFFIX)
                .with_info("original", "")
                .into(),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to store base64 upload");
                BasicState::failure(StateCode::IoError).into()
            }
        }
    }
}

/// Expands the save-path template and appends the suffix.
pub fn destination(template: &str, file_name: Option<&str>, suffix: &str) -> String {
    path_format::normalize(&format!("{}{}", path_format::expand(template, file_name), suffix))
}

/// Success state shared by every persisted payload.
pub fn stored_state(stored: &StoredObject) -> BasicState {
    BasicState::success()
        .with_info("size", stored.size)
        .with_info("title", stored.title.as_str())
        .with_info("url", stored.key.as_str())
}

fn decode_base64(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    // Accept data URLs as well as bare base64.
    let encoded = match content.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => content,
    };

    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    general_purpose::STANDARD.decode(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::LocalStorage;
    use crate::state::InfoValue;
    use tempfile::TempDir;

    async fn uploader(temp_dir: &TempDir) -> Uploader {
        let storage = LocalStorage::new(temp_dir.path()).await.unwrap();
        Uploader::new(Arc::new(storage))
    }

    fn image_config() -> ActionConfig {
        ActionConfig {
            field_name: "upfile".to_string(),
            save_path: "/upload/{filename}_{rand:4}".to_string(),
            max_size: 16,
            allow_files: vec![".png".to_string(), ".jpg".to_string()],
            ..Default::default()
        }
    }

    fn part(file_name: &str, data: &'static [u8]) -> UploadPart {
        UploadPart {
            field_name: "upfile".to_string(),
            file_name: file_name.to_string(),
            content_type: None,
            data: Bytes::from_static(data),
        }
    }

    fn text<'a>(state: &'a BasicState, key: &str) -> &'a str {
        match state.info(key) {
            Some(InfoValue::Text(text)) => text,
            other => panic!("expected text for {}, got {:?}", key, other),
        }
    }

    fn file_count(dir: &std::path::Path) -> usize {
        let mut count = 0;
        let mut pending = vec![dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    count += 1;
                }
            }
        }
        count
    }

    #[tokio::test]
    async fn test_single_part_upload() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;
        let payload = Payload::Multipart(vec![part("Photo.PNG", b"png-bytes")]);

        let state = uploader.store_stream(&payload, &image_config()).await;
        let ResponseState::Basic(state) = state else {
            panic!("expected a basic state");
        };

        assert!(state.is_success());
        assert_eq!(state.info("size"), Some(&InfoValue::Number(9)));
        assert_eq!(text(&state, "type"), ".png");
        assert_eq!(text(&state, "original"), "Photo.PNG");

        let url = text(&state, "url");
        assert!(url.starts_with("/upload/Photo_"));
        assert!(url.ends_with(".png"));
        let stored = std::fs::read(temp_dir.path().join(url.trim_start_matches('/'))).unwrap();
        assert_eq!(stored, b"png-bytes");
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;

        let state = uploader.store_stream(&Payload::Absent, &image_config()).await;
        assert_eq!(state, BasicState::failure(StateCode::NotMultipartContent).into());

        let state = uploader.store_stream(&Payload::Malformed, &image_config()).await;
        assert_eq!(state, BasicState::failure(StateCode::ParseRequestError).into());

        let state = uploader
            .store_stream(&Payload::Multipart(Vec::new()), &image_config())
            .await;
        assert_eq!(state, BasicState::failure(StateCode::NotFoundUploadData).into());
    }

    #[tokio::test]
    async fn test_disallowed_type_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;
        let payload = Payload::Multipart(vec![part("a.png", b"ok"), part("run.exe", b"MZ")]);

        let state = uploader.store_stream(&payload, &image_config()).await;
        assert_eq!(state, BasicState::failure(StateCode::NotAllowFileType).into());
        assert_eq!(file_count(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_oversized_part_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;
        let payload = Payload::Multipart(vec![part("big.jpg", b"0123456789abcdefXYZ")]);

        let state = uploader.store_stream(&payload, &image_config()).await;
        assert_eq!(state, BasicState::failure(StateCode::MaxSize).into());
        assert_eq!(file_count(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_multiple_parts_are_aggregated() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;
        let payload = Payload::Multipart(vec![part("a.png", b"a"), part("b.jpg", b"b")]);

        let state = uploader.store_stream(&payload, &image_config()).await;
        let ResponseState::Multi(state) = state else {
            panic!("expected a multi state");
        };

        assert!(state.is_success());
        assert_eq!(state.children().len(), 2);
        assert!(state.children()[0].contains("\"original\": \"a.png\""));
        assert!(state.children()[1].contains("\"original\": \"b.jpg\""));
        assert_eq!(file_count(temp_dir.path()), 2);
    }

    #[tokio::test]
    async fn test_store_encoded() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;
        let config = ActionConfig {
            save_path: "/scrawl/{filename}".to_string(),
            file_name: Some("scrawl".to_string()),
            max_size: 16,
            is_base64: true,
            ..Default::default()
        };

        let encoded = general_purpose::STANDARD.encode(b"scribble");
        let state = uploader.store_encoded(Some(&encoded), &config).await;

        assert_eq!(
            state.serialize(),
            r#"{"state": "SUCCESS","size": 8,"title": "scrawl.jpg","url": "/scrawl/scrawl.jpg","type": ".jpg","original": ""}"#
        );
        let stored = std::fs::read(temp_dir.path().join("scrawl/scrawl.jpg")).unwrap();
        assert_eq!(stored, b"scribble");
    }

    #[tokio::test]
    async fn test_store_encoded_accepts_data_url() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;
        let config = ActionConfig {
            save_path: "/scrawl/x".to_string(),
            max_size: 16,
            ..Default::default()
        };

        let encoded = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(b"dot"));
        let state = uploader.store_encoded(Some(&encoded), &config).await;
        assert!(state.is_success());
    }

    #[tokio::test]
    async fn test_store_encoded_over_limit_never_reaches_disk() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;
        let config = ActionConfig {
            save_path: "/scrawl/{time}".to_string(),
            max_size: 4,
            ..Default::default()
        };

        let encoded = general_purpose::STANDARD.encode(b"too many bytes");
        let state = uploader.store_encoded(Some(&encoded), &config).await;

        assert_eq!(state, BasicState::failure(StateCode::MaxSize).into());
        assert_eq!(file_count(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_store_encoded_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = uploader(&temp_dir).await;
        let config = ActionConfig {
            max_size: 4,
            ..Default::default()
        };

        let state = uploader.store_encoded(None, &config).await;
        assert_eq!(state, BasicState::failure(StateCode::NotFoundUploadData).into());

        let state = uploader.store_encoded(Some("@@not base64@@"), &config).await;
        assert_eq!(state, BasicState::failure(StateCode::ParseRequestError).into());
    }
}
