//! WebSocket request records.

use super::{BaseModel, Model, Repository};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "WebSocket Request";
pub const TYPE: &str = "WebSocketRequest";
pub const PREFIX: &str = "ws-req";

/// Fields a WebSocket request carries on top of [`BaseModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseWebSocketRequest {
    pub name: String,
    pub url: String,
    /// Manual ordering key; ascending order puts the newest record first.
    pub meta_sort_key: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketRequest {
    #[serde(flatten)]
    pub base: BaseModel,
    pub name: String,
    pub url: String,
    pub meta_sort_key: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketRequestPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_sort_key: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

impl WebSocketRequestPatch {
    pub fn with_parent(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::default()
        }
    }
}

impl Model for WebSocketRequest {
    const NAME: &'static str = NAME;
    const TYPE: &'static str = TYPE;
    const PREFIX: &'static str = PREFIX;
    const CAN_DUPLICATE: bool = true;
    const CAN_SYNC: bool = false;
    const REQUIRES_PARENT: bool = true;

    type Fields = BaseWebSocketRequest;
    type Patch = WebSocketRequestPatch;

    fn init() -> BaseWebSocketRequest {
        init()
    }

    fn base(&self) -> &BaseModel {
        &self.base
    }
}

/// Default values for a new request. The sort key is the negated creation
/// time, so a later call never yields a larger key than an earlier one.
pub fn init() -> BaseWebSocketRequest {
    BaseWebSocketRequest {
        name: "New WebSocket Request".to_string(),
        url: String::new(),
        meta_sort_key: -(chrono::Utc::now().timestamp_millis() as f64),
    }
}

pub fn is_websocket_request(model: &BaseModel) -> bool {
    model.type_tag == TYPE
}

pub type WebSocketRequestRepository = Repository<WebSocketRequest>;
