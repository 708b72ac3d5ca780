pub mod config;
pub mod deeplink;
pub mod host;
pub mod models;
pub mod oauth;
pub mod plugins;
pub mod registry;
pub mod session;
pub mod shell;
pub mod store;

use std::sync::Arc;

pub use config::{AppConfig, BuildMode};
pub use deeplink::{DispatchOutcome, Dispatcher, LinkScheme};
pub use host::Capabilities;
pub use shell::{RouteDecision, ScratchPad, Surface};

use deeplink::GitProvider;
use host::{ModalService, Navigator};
use models::Repository;
use models::settings::Settings;
use oauth::HttpCodeExchange;
use plugins::FsPluginHost;
use store::FileStore;

/// File name of the document database inside the config directory.
pub const DOCUMENTS_FILE: &str = "documents.json";

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` level.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Token exchange for `provider`, sharing pending state and credentials with
/// every other instance that uses the config directory.
pub fn git_exchange(config: &AppConfig, provider: GitProvider) -> HttpCodeExchange {
    let provider_config = match provider {
        GitProvider::GitHub => config.github.clone(),
        GitProvider::GitLab => config.gitlab.clone(),
    };
    HttpCodeExchange::new(provider, provider_config)
}

/// Wire the disk-backed capabilities: settings in `documents.json`, plugins
/// under `plugins/`, and token exchange for both git providers. The host
/// supplies the interactive pieces; `ScratchPad` installs the import sink.
pub fn desktop_capabilities(
    config: &AppConfig,
    modals: Arc<dyn ModalService>,
    navigator: Arc<dyn Navigator>,
) -> Result<Capabilities, String> {
    let documents = config::config_dir().join(DOCUMENTS_FILE);
    let store = FileStore::open(documents).map_err(|e| e.to_string())?;

    Ok(Capabilities {
        modals,
        plugins: Arc::new(FsPluginHost::new(
            plugins::plugins_dir(),
            config.plugin_registry_url.clone(),
        )),
        settings: Arc::new(Repository::<Settings>::new(Arc::new(store))),
        github: Arc::new(git_exchange(config, GitProvider::GitHub)),
        gitlab: Arc::new(git_exchange(config, GitProvider::GitLab)),
        navigator,
        import: Arc::new(shell::ImportState::default()),
    })
}
