// Routes a named action to its operation and renders the response body

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::FileCatalog;
use crate::catcher::{ImageCatcher, RemoteFetcher};
use crate::config::ConfigManager;
use crate::metrics::SharedMetrics;
use crate::state::{BasicState, ResponseState, StateCode};
use crate::storage::Storage;
use crate::upload::{Payload, Uploader};

pub const ACTION_PARAM: &str = "action";
pub const CALLBACK_PARAM: &str = "callback";
pub const START_PARAM: &str = "start";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Config,
    UploadImage,
    UploadScrawl,
    UploadVideo,
    UploadFile,
    CatchImage,
    ListFile,
    ListImage,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Config,
        Action::UploadImage,
        Action::UploadScrawl,
        Action::UploadVideo,
        Action::UploadFile,
        Action::CatchImage,
        Action::ListFile,
        Action::ListImage,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Action::Config => "config",
            Action::UploadImage => "uploadimage",
            Action::UploadScrawl => "uploadscrawl",
            Action::UploadVideo => "uploadvideo",
            Action::UploadFile => "uploadfile",
            Action::CatchImage => "catchimage",
            Action::ListFile => "listfile",
            Action::ListImage => "listimage",
        }
    }
}

/// Case-insensitive lookup from action name to `Action`, built once.
#[derive(Debug, Clone)]
pub struct ActionTable {
    by_name: HashMap<&'static str, Action>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self {
            by_name: Action::ALL
                .into_iter()
                .map(|action| (action.name(), action))
                .collect(),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Action> {
        self.by_name
            .get(name.trim().to_ascii_lowercase().as_str())
            .copied()
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport-neutral view of one request.
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    params: Vec<(String, String)>,
    payload: Payload,
}

impl ActionRequest {
    pub fn new(params: Vec<(String, String)>, payload: Payload) -> Self {
        Self { params, payload }
    }

    /// First value of `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Every value of a repeated parameter, in request order.
    pub fn param_values(&self, name: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// A rendered response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResponse {
    pub body: String,
    /// Set when the body is a callback invocation rather than bare JSON.
    pub wrapped: bool,
}

impl DispatchResponse {
    fn plain(body: String) -> Self {
        Self {
            body,
            wrapped: false,
        }
    }
}

/// What an action produced before callback wrapping.
enum Reply {
    State(ResponseState),
    /// Configuration snapshot, passed through untouched.
    Raw(String),
}

impl Reply {
    fn message(&self) -> &str {
        match self {
            Reply::State(state) => state.message(),
            Reply::Raw(_) => "",
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Reply::State(state) if state.is_success() => "success",
            Reply::State(_) => "failure",
            Reply::Raw(_) => "raw",
        }
    }

    fn into_body(self) -> String {
        match self {
            Reply::State(state) => state.serialize(),
            Reply::Raw(text) => text,
        }
    }
}

pub struct Dispatcher {
    actions: ActionTable,
    config: Arc<ConfigManager>,
    uploader: Uploader,
    catalog: FileCatalog,
    catcher: ImageCatcher,
    metrics: SharedMetrics,
}

impl Dispatcher {
    pub fn new(
        actions: ActionTable,
        config: Arc<ConfigManager>,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn RemoteFetcher>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            actions,
            config,
            uploader: Uploader::new(storage.clone()),
            catalog: FileCatalog::new(storage.clone()),
            catcher: ImageCatcher::new(storage, fetcher),
            metrics,
        }
    }

    /// Produces the response body for a request. Never fails.
    pub async fn dispatch(&self, request: &ActionRequest) -> DispatchResponse {
        let Some(callback) = request.param(CALLBACK_PARAM) else {
            return DispatchResponse::plain(self.invoke(request).await);
        };

        // Checked before the action runs so an illegal callback has no side effects.
        if !is_valid_callback(callback) {
            tracing::warn!(
                callback = %callback,
                code = StateCode::Illegal.code(),
                "Rejected illegal callback name"
            );
            self.reject("illegal_callback");
            return DispatchResponse::plain(BasicState::failure(StateCode::Illegal).serialize());
        }

        let body = self.invoke(request).await;
        DispatchResponse {
            body: format!("{}({});", callback, body),
            wrapped: true,
        }
    }

    async fn invoke(&self, request: &ActionRequest) -> String {
        let action_name = request.param(ACTION_PARAM);

        let Some(action) = action_name.and_then(|name| self.actions.resolve(name)) else {
            tracing::warn!(
                action = action_name.unwrap_or_default(),
                code = StateCode::InvalidAction.code(),
                "Unknown action"
            );
            self.reject("invalid_action");
            return BasicState::failure(StateCode::InvalidAction).serialize();
        };

        if !self.config.is_valid() {
            tracing::error!(
                action = action.name(),
                code = StateCode::ConfigError.code(),
                "Editor configuration is not loaded"
            );
            self.reject("config_error");
            return BasicState::failure(StateCode::ConfigError).serialize();
        }

        let started = Instant::now();
        let reply = self.execute(action, request).await;

        self.metrics
            .action_duration
            .with_label_values(&[action.name()])
            .observe(started.elapsed().as_secs_f64());
        self.metrics
            .actions_total
            .with_label_values(&[action.name(), reply.outcome()])
            .inc();

        tracing::debug!(
            action = action.name(),
            outcome = reply.outcome(),
            state = reply.message(),
            "Action finished"
        );
        reply.into_body()
    }

    async fn execute(&self, action: Action, request: &ActionRequest) -> Reply {
        let Some(config) = self.config.action_config(action) else {
            return Reply::State(BasicState::failure(StateCode::ConfigError).into());
        };

        let state = match action {
            Action::Config => {
                return match self.config.snapshot() {
                    Some(snapshot) => Reply::Raw(snapshot),
                    None => Reply::State(BasicState::failure(StateCode::ConfigError).into()),
                }
            }
            Action::UploadImage | Action::UploadScrawl | Action::UploadVideo | Action::UploadFile => {
                if config.is_base64 {
                    let content = request.param(&config.field_name);
                    self.uploader.store_encoded(content, &config).await
                } else {
                    self.record_received(action, request.payload());
                    self.uploader.store_stream(request.payload(), &config).await
                }
            }
            Action::CatchImage => {
                let sources = request.param_values(&config.field_name);
                self.catcher.capture(&sources, &config).await
            }
            Action::ListFile | Action::ListImage => {
                let start = request
                    .param(START_PARAM)
                    .and_then(|value| value.trim().parse::<i64>().ok())
                    .unwrap_or(0);
                self.catalog.list(&config, start).await
            }
        };

        Reply::State(state)
    }

    fn reject(&self, reason: &str) {
        self.metrics.rejections_total.with_label_values(&[reason]).inc();
    }

    fn record_received(&self, action: Action, payload: &Payload) {
        if let Payload::Multipart(parts) = payload {
            let bytes: usize = parts.iter().map(|part| part.data.len()).sum();
            self.metrics
                .received_bytes
                .with_label_values(&[action.name()])
                .inc_by(bytes as u64);
        }
    }
}

/// `^[A-Za-z_][A-Za-z0-9_]*$`
pub fn is_valid_callback(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
