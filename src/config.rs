use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;

use crate::dispatch::Action;
use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub editor: EditorSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub cors: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_route() -> String {
    "/controller".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditorSettings {
    /// Physical directory every save path and listing is resolved against.
    pub root_path: String,
    /// JSON file handed to the widget for `action=config`.
    pub config_path: String,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
}

fn default_fetch_timeout_seconds() -> u64 {
    10
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| ApiError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }
}

/// Server-side view of the widget configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub image_field_name: String,
    pub image_max_size: u64,
    pub image_allow_files: Vec<String>,
    pub image_path_format: String,

    pub scrawl_field_name: String,
    pub scrawl_max_size: u64,
    pub scrawl_path_format: String,

    pub catcher_local_domain: Vec<String>,
    pub catcher_field_name: String,
    pub catcher_max_size: u64,
    pub catcher_allow_files: Vec<String>,
    pub catcher_path_format: String,

    pub video_field_name: String,
    pub video_max_size: u64,
    pub video_allow_files: Vec<String>,
    pub video_path_format: String,

    pub file_field_name: String,
    pub file_max_size: u64,
    pub file_allow_files: Vec<String>,
    pub file_path_format: String,

    pub image_manager_list_path: String,
    pub image_manager_list_size: usize,
    pub image_manager_allow_files: Vec<String>,

    pub file_manager_list_path: String,
    pub file_manager_list_size: usize,
    pub file_manager_allow_files: Vec<String>,
}

fn extensions(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for EditorConfig {
    fn default() -> Self {
        let images = [".png", ".jpg", ".jpeg", ".gif", ".bmp"];
        let videos = [
            ".flv", ".swf", ".mkv", ".avi", ".rm", ".rmvb", ".mpeg", ".mpg", ".ogg", ".ogv",
            ".mov", ".wmv", ".mp4", ".webm", ".mp3", ".wav", ".mid",
        ];
        let files = [
            ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".flv", ".swf", ".mkv", ".avi", ".rm",
            ".rmvb", ".mpeg", ".mpg", ".ogg", ".ogv", ".mov", ".wmv", ".mp4", ".webm", ".mp3",
            ".wav", ".mid", ".rar", ".zip", ".tar", ".gz", ".7z", ".bz2", ".cab", ".iso", ".doc",
            ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".pdf", ".txt", ".md", ".xml",
        ];

        Self {
            image_field_name: "upfile".to_string(),
            image_max_size: 2_048_000,
            image_allow_files: extensions(&images),
            image_path_format: "/upload/image/{yyyy}{mm}{dd}/{time}{rand:6}".to_string(),

            scrawl_field_name: "upfile".to_string(),
            scrawl_max_size: 2_048_000,
            scrawl_path_format: "/upload/image/{yyyy}{mm}{dd}/{time}{rand:6}".to_string(),

            catcher_local_domain: extensions(&["127.0.0.1", "localhost", "img.baidu.com"]),
            catcher_field_name: "source".to_string(),
            catcher_max_size: 2_048_000,
            catcher_allow_files: extensions(&images),
            catcher_path_format: "/upload/image/{yyyy}{mm}{dd}/{time}{rand:6}".to_string(),

            video_field_name: "upfile".to_string(),
            video_max_size: 102_400_000,
            video_allow_files: extensions(&videos),
            video_path_format: "/upload/video/{yyyy}{mm}{dd}/{time}{rand:6}".to_string(),

            file_field_name: "upfile".to_string(),
            file_max_size: 51_200_000,
            file_allow_files: extensions(&files),
            file_path_format: "/upload/file/{yyyy}{mm}{dd}/{time}{rand:6}".to_string(),

            image_manager_list_path: "/upload/image/".to_string(),
            image_manager_list_size: 20,
            image_manager_allow_files: extensions(&images),

            file_manager_list_path: "/upload/file/".to_string(),
            file_manager_list_size: 20,
            file_manager_allow_files: extensions(&files),
        }
    }
}

/// Options for a single action, resolved fresh for every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionConfig {
    pub field_name: String,
    pub save_path: String,
    /// Fixed base name for payloads that carry none (scrawls, captures).
    pub file_name: Option<String>,
    pub max_size: u64,
    pub allow_files: Vec<String>,
    pub is_base64: bool,
    pub list_dir: String,
    pub list_size: usize,
    /// Hosts image capture refuses to contact.
    pub blocked_hosts: Vec<String>,
}

/// Holds the widget configuration loaded at startup.
///
/// A file that cannot be read or parsed leaves the manager invalid instead of
/// failing startup; every action then reports a configuration error.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    loaded: Option<LoadedConfig>,
}

#[derive(Debug, Clone)]
struct LoadedConfig {
    snapshot: JsonValue,
    editor: EditorConfig,
}

impl ConfigManager {
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        match fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("Failed to read editor config: {}", e)))
            .and_then(|contents| Self::from_json_str(&contents))
        {
            Ok(manager) => {
                tracing::info!("Loaded editor configuration from: {}", path.display());
                manager
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Editor configuration unavailable");
                Self::invalid()
            }
        }
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let snapshot: JsonValue = serde_json::from_str(&strip_block_comments(contents))
            .map_err(|e| ApiError::Config(format!("Failed to parse editor config: {}", e)))?;

        let editor: EditorConfig = serde_json::from_value(snapshot.clone())
            .map_err(|e| ApiError::Config(format!("Invalid editor config: {}", e)))?;

        Ok(Self {
            loaded: Some(LoadedConfig { snapshot, editor }),
        })
    }

    pub fn invalid() -> Self {
        Self { loaded: None }
    }

    pub fn is_valid(&self) -> bool {
        self.loaded.is_some()
    }

    /// The widget configuration as compact JSON text.
    pub fn snapshot(&self) -> Option<String> {
        self.loaded.as_ref().map(|loaded| loaded.snapshot.to_string())
    }

    pub fn action_config(&self, action: Action) -> Option<ActionConfig> {
        let editor = &self.loaded.as_ref()?.editor;

        let config = match action {
            Action::Config => ActionConfig::default(),
            Action::UploadImage => ActionConfig {
                field_name: editor.image_field_name.clone(),
                save_path: editor.image_path_format.clone(),
                max_size: editor.image_max_size,
                allow_files: editor.image_allow_files.clone(),
                ..Default::default()
            },
            Action::UploadScrawl => ActionConfig {
                field_name: editor.scrawl_field_name.clone(),
                save_path: editor.scrawl_path_format.clone(),
                file_name: Some("scrawl".to_string()),
                max_size: editor.scrawl_max_size,
                is_base64: true,
                ..Default::default()
            },
            Action::UploadVideo => ActionConfig {
                field_name: editor.video_field_name.clone(),
                save_path: editor.video_path_format.clone(),
                max_size: editor.video_max_size,
                allow_files: editor.video_allow_files.clone(),
                ..Default::default()
            },
            Action::UploadFile => ActionConfig {
                field_name: editor.file_field_name.clone(),
                save_path: editor.file_path_format.clone(),
                max_size: editor.file_max_size,
                allow_files: editor.file_allow_files.clone(),
                ..Default::default()
            },
            Action::CatchImage => ActionConfig {
                field_name: format!("{}[]", editor.catcher_field_name),
                save_path: editor.catcher_path_format.clone(),
                file_name: Some("remote".to_string()),
                max_size: editor.catcher_max_size,
                allow_files: editor.catcher_allow_files.clone(),
                blocked_hosts: editor.catcher_local_domain.clone(),
                ..Default::default()
            },
            Action::ListImage => ActionConfig {
                allow_files: editor.image_manager_allow_files.clone(),
                list_dir: editor.image_manager_list_path.clone(),
                list_size: editor.image_manager_list_size,
                ..Default::default()
            },
            Action::ListFile => ActionConfig {
                allow_files: editor.file_manager_allow_files.clone(),
                list_dir: editor.file_manager_list_path.clone(),
                list_size: editor.file_manager_list_size,
                ..Default::default()
            },
        };

        Some(config)
    }
}

/// Removes `/* ... */` comments that sit outside JSON strings.
fn strip_block_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        if in_string {
            output.push(ch);
            match ch {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        output.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                output.push(ch);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for inner in chars.by_ref() {
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    previous = inner;
                }
            }
            _ => output.push(ch),
        }
    }

    output
}
