//! The scratch-pad route: redirect when signed in, otherwise the
//! deep-link-aware screen.

use crate::config::AppConfig;
use crate::deeplink::{DispatchOutcome, Dispatcher, LinkScheme};
use crate::host::{Capabilities, ImportSink};
use crate::session::SessionSource;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Route signed-in users are sent to.
pub const ORGANIZATION_ROUTE: &str = "organization";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Redirect(String),
    Render,
}

/// Route loader: an active session skips the scratch pad entirely.
pub fn load_route(session: &dyn SessionSource) -> RouteDecision {
    match session.current_session_id() {
        Some(_) => RouteDecision::Redirect(ORGANIZATION_ROUTE.to_string()),
        None => RouteDecision::Render,
    }
}

// ---------------------------------------------------------------------------
// Import state
// ---------------------------------------------------------------------------

/// URI of an import requested by a deep link, shown on the next render.
#[derive(Default)]
pub struct ImportState {
    uri: Mutex<Option<String>>,
}

impl ImportState {
    /// The pending URI. An empty string counts as nothing pending.
    pub fn pending(&self) -> Option<String> {
        self.uri.lock().clone().filter(|uri| !uri.is_empty())
    }

    pub fn clear(&self) {
        *self.uri.lock() = None;
    }
}

impl ImportSink for ImportState {
    fn set_import_uri(&self, uri: Option<String>) {
        *self.uri.lock() = uri;
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportDialog {
    /// Seeds the "from URI" field of the import workflow.
    pub uri: String,
    pub project_name: String,
    pub organization_id: String,
}

/// One piece of the rendered screen, in paint order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Surface {
    ImportDialog(ImportDialog),
    Modals,
    Navbar,
    Header,
    Outlet,
    StatusBar,
    Toast,
}

pub struct ScratchPad {
    dispatcher: Dispatcher,
    import: Arc<ImportState>,
    project_name: String,
    organization_id: String,
}

impl ScratchPad {
    /// Build the screen around a dispatcher. The import capability in `caps`
    /// is replaced by the screen's own import state.
    pub fn new(config: &AppConfig, mut caps: Capabilities, runtime: Handle) -> Self {
        let import = Arc::new(ImportState::default());
        caps.import = import.clone() as Arc<dyn ImportSink>;
        Self {
            dispatcher: Dispatcher::new(LinkScheme::from_config(config), caps, runtime),
            import,
            project_name: config.project_name.clone(),
            organization_id: config.organization_id.clone(),
        }
    }

    /// Deliver one deep link from the host.
    pub fn open_url(&self, url: &str) -> DispatchOutcome {
        self.dispatcher.dispatch(url)
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Dismiss the import dialog.
    pub fn hide_import(&self) {
        self.import.clear();
    }

    pub fn render(&self) -> Vec<Surface> {
        let mut surfaces = Vec::with_capacity(7);
        if let Some(uri) = self.import.pending() {
            surfaces.push(Surface::ImportDialog(ImportDialog {
                uri,
                project_name: self.project_name.clone(),
                organization_id: self.organization_id.clone(),
            }));
        }
        surfaces.extend([
            Surface::Modals,
            Surface::Navbar,
            Surface::Header,
            Surface::Outlet,
            Surface::StatusBar,
            Surface::Toast,
        ]);
        surfaces
    }
}
