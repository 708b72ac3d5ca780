//! Account session lookup.

use crate::config;
use serde::{Deserialize, Serialize};

pub trait SessionSource: Send + Sync {
    /// Identifier of the signed-in session, if any.
    fn current_session_id(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    id: Option<String>,
}

/// Session persisted as `session.json` in the config directory.
pub struct FileSession;

impl SessionSource for FileSession {
    fn current_session_id(&self) -> Option<String> {
        let session: SessionFile = config::load_json_config("session.json");
        session.id.filter(|id| !id.is_empty())
    }
}

/// Fixed session value, for embedding hosts that track sessions themselves.
pub struct StaticSession(pub Option<String>);

impl SessionSource for StaticSession {
    fn current_session_id(&self) -> Option<String> {
        self.0.clone()
    }
}
