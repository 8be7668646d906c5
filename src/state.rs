// Result states reported to the editor widget and their wire format

use std::fmt;

use crate::escape::escape_unicode;

/// Fixed state codes understood by the editor widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateCode {
    Success,
    MaxSize,
    PermissionDenied,
    FailedCreateFile,
    IoError,
    NotMultipartContent,
    ParseRequestError,
    NotFoundUploadData,
    NotAllowFileType,
    InvalidAction,
    ConfigError,
    PreventHost,
    ConnectionError,
    RemoteFail,
    NotDirectory,
    NotExist,
    Illegal,
}

impl StateCode {
    #[cfg(test)]
    pub(crate) const ALL: [StateCode; 17] = [
        StateCode::Success,
        StateCode::MaxSize,
        StateCode::PermissionDenied,
        StateCode::FailedCreateFile,
        StateCode::IoError,
        StateCode::NotMultipartContent,
        StateCode::ParseRequestError,
        StateCode::NotFoundUploadData,
        StateCode::NotAllowFileType,
        StateCode::InvalidAction,
        StateCode::ConfigError,
        StateCode::PreventHost,
        StateCode::ConnectionError,
        StateCode::RemoteFail,
        StateCode::NotDirectory,
        StateCode::NotExist,
        StateCode::Illegal,
    ];

    pub const fn code(self) -> u16 {
        match self {
            StateCode::Success => 0,
            StateCode::MaxSize => 1,
            StateCode::PermissionDenied => 2,
            StateCode::FailedCreateFile => 3,
            StateCode::IoError => 4,
            StateCode::NotMultipartContent => 5,
            StateCode::ParseRequestError => 6,
            StateCode::NotFoundUploadData => 7,
            StateCode::NotAllowFileType => 8,
            StateCode::InvalidAction => 101,
            StateCode::ConfigError => 102,
            StateCode::PreventHost => 201,
            StateCode::ConnectionError => 202,
            StateCode::RemoteFail => 203,
            StateCode::NotDirectory => 301,
            StateCode::NotExist => 302,
            StateCode::Illegal => 401,
        }
    }

    /// Canonical message for the code, as the widget displays it.
    pub const fn message(self) -> &'static str {
        match self {
            StateCode::Success => "SUCCESS",
            StateCode::MaxSize => "文件大小超出限制",
            StateCode::PermissionDenied => "权限不足",
            StateCode::FailedCreateFile => "创建文件失败",
            StateCode::IoError => "IO错误",
            StateCode::NotMultipartContent => "上传表单不是multipart/form-data类型",
            StateCode::ParseRequestError => "解析上传表单错误",
            StateCode::NotFoundUploadData => "未找到上传数据",
            StateCode::NotAllowFileType => "不允许的文件类型",
            StateCode::InvalidAction => "无效的Action",
            StateCode::ConfigError => "配置文件初始化失败",
            StateCode::PreventHost => "被阻止的远程主机",
            StateCode::ConnectionError => "远程连接出错",
            StateCode::RemoteFail => "抓取远程图片失败",
            StateCode::NotDirectory => "指定路径不是目录",
            StateCode::NotExist => "指定路径并不存在",
            StateCode::Illegal => "Callback参数名不合法",
        }
    }

    #[cfg(test)]
    pub(crate) fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.code() == code)
    }
}

/// Message of a failure state: either free text or a fixed code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateMessage {
    Text(String),
    Code(StateCode),
}

impl StateMessage {
    fn resolve(self) -> String {
        match self {
            StateMessage::Text(text) => text,
            StateMessage::Code(code) => code.message().to_string(),
        }
    }
}

impl From<StateCode> for StateMessage {
    fn from(code: StateCode) -> Self {
        StateMessage::Code(code)
    }
}

impl From<&str> for StateMessage {
    fn from(text: &str) -> Self {
        StateMessage::Text(text.to_string())
    }
}

impl From<String> for StateMessage {
    fn from(text: String) -> Self {
        StateMessage::Text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    Text(String),
    Number(i64),
}

impl From<&str> for InfoValue {
    fn from(value: &str) -> Self {
        InfoValue::Text(value.to_string())
    }
}

impl From<String> for InfoValue {
    fn from(value: String) -> Self {
        InfoValue::Text(value)
    }
}

impl From<i64> for InfoValue {
    fn from(value: i64) -> Self {
        InfoValue::Number(value)
    }
}

impl From<i32> for InfoValue {
    fn from(value: i32) -> Self {
        InfoValue::Number(value.into())
    }
}

impl From<u32> for InfoValue {
    fn from(value: u32) -> Self {
        InfoValue::Number(value.into())
    }
}

impl From<u64> for InfoValue {
    fn from(value: u64) -> Self {
        InfoValue::Number(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for InfoValue {
    fn from(value: usize) -> Self {
        InfoValue::Number(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

fn resolve_message(success: bool, message: StateMessage) -> String {
    if success {
        StateCode::Success.message().to_string()
    } else {
        message.resolve()
    }
}

/// A flat result: state message plus ordered key/value details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicState {
    success: bool,
    message: String,
    info: Vec<(String, InfoValue)>,
}

impl BasicState {
    pub fn new(success: bool, message: impl Into<StateMessage>) -> Self {
        Self {
            success,
            message: resolve_message(success, message.into()),
            info: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(true, StateCode::Success)
    }

    pub fn failure(message: impl Into<StateMessage>) -> Self {
        Self::new(false, message)
    }

    /// Sets `key`, keeping its original position when it already exists.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<InfoValue>) -> Self {
        let key = key.into();
        let value = value.into();

        match self.info.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.info.push((key, value)),
        }

        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    #[cfg(test)]
    pub(crate) fn info(&self, key: &str) -> Option<&InfoValue> {
        self.info
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("{{\"state\": \"{}\"", self.message);

        for (key, value) in &self.info {
            match value {
                InfoValue::Text(text) => out.push_str(&format!(",\"{}\": \"{}\"", key, text)),
                InfoValue::Number(number) => out.push_str(&format!(",\"{}\": {}", key, number)),
            }
        }

        out.push('}');
        escape_unicode(&out)
    }
}

/// A result carrying a list of nested basic states.
///
/// Numeric details are always written before text details, and children are
/// embedded as the text they serialized to when they were added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiState {
    success: bool,
    message: String,
    numbers: Vec<(String, i64)>,
    texts: Vec<(String, String)>,
    children: Vec<String>,
}

impl MultiState {
    pub fn new(success: bool, message: impl Into<StateMessage>) -> Self {
        Self {
            success,
            message: resolve_message(success, message.into()),
            numbers: Vec::new(),
            texts: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(true, StateCode::Success)
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<InfoValue>) -> Self {
        let key = key.into();

        match value.into() {
            InfoValue::Number(number) => {
                self.texts.retain(|(existing, _)| *existing != key);
                match self.numbers.iter_mut().find(|(existing, _)| *existing == key) {
                    Some(slot) => slot.1 = number,
                    None => self.numbers.push((key, number)),
                }
            }
            InfoValue::Text(text) => {
                self.numbers.retain(|(existing, _)| *existing != key);
                match self.texts.iter_mut().find(|(existing, _)| *existing == key) {
                    Some(slot) => slot.1 = text,
                    None => self.texts.push((key, text)),
                }
            }
        }

        self
    }

    pub fn with_child(mut self, child: &BasicState) -> Self {
        self.children.push(child.serialize());
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    #[cfg(test)]
    pub(crate) fn number(&self, key: &str) -> Option<i64> {
        self.numbers
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| *value)
    }

    #[cfg(test)]
    pub(crate) fn children(&self) -> &[String] {
        &self.children
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("{{\"state\": \"{}\"", self.message);

        for (key, number) in &self.numbers {
            out.push_str(&format!(",\"{}\": {}", key, number));
        }
        for (key, text) in &self.texts {
            out.push_str(&format!(",\"{}\": \"{}\"", key, text));
        }

        out.push_str(", list: [");
        out.push_str(&self.children.join(","));
        out.push_str(" ]}");

        escape_unicode(&out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseState {
    Basic(BasicState),
    Multi(MultiState),
}

impl ResponseState {
    pub fn is_success(&self) -> bool {
        match self {
            ResponseState::Basic(state) => state.is_success(),
            ResponseState::Multi(state) => state.is_success(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ResponseState::Basic(state) => state.message(),
            ResponseState::Multi(state) => state.message(),
        }
    }

    pub fn serialize(&self) -> String {
        match self {
            ResponseState::Basic(state) => state.serialize(),
            ResponseState::Multi(state) => state.serialize(),
        }
    }
}

impl From<BasicState> for ResponseState {
    fn from(state: BasicState) -> Self {
        ResponseState::Basic(state)
    }
}

impl From<MultiState> for ResponseState {
    fn from(state: MultiState) -> Self {
        ResponseState::Multi(state)
    }
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
