//! Deep-link routing for the private URL scheme.
//!
//! The host hands every `<scheme>://…` URL it intercepts to
//! [`Dispatcher::dispatch`]. The URL is reduced to a routing key (everything
//! before the first `?`), the query becomes a key → value map, and the key is
//! looked up by exact string equality. Each hit runs one [`LinkHandler`];
//! handlers that need I/O return a future which the dispatcher spawns and hands
//! back to the caller as a [`tokio::task::JoinHandle`]. Nothing is queued or
//! serialized: two links delivered back to back run their handlers concurrently.

mod handlers;
#[cfg(test)]
pub(crate) mod test_support;

pub use handlers::{
    AlertHandler, AuthFinishHandler, AuthLoginHandler, GitProvider, ImportHandler, LinkHandler,
    OAuthFinishHandler, PluginInstallHandler, PluginThemeHandler, ThemeLink,
    PLUGIN_INSTALL_TITLE, THEME_INSTALL_TITLE, THEME_PLUGIN_VERSION,
};

use crate::config::{AppConfig, BuildMode};
use crate::host::Capabilities;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

/// Decoded query parameters of a link. Repeated keys keep the last value.
pub type LinkParams = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Scheme & parsing
// ---------------------------------------------------------------------------

/// The schemes a build answers to and whether the development rewrite applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkScheme {
    pub canonical: String,
    pub development: String,
    pub mode: BuildMode,
}

impl LinkScheme {
    pub fn new(canonical: impl Into<String>, development: impl Into<String>, mode: BuildMode) -> Self {
        Self {
            canonical: canonical.into(),
            development: development.into(),
            mode,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.link_scheme, &config.dev_link_scheme, config.build_mode)
    }

    /// Full routing key for an action path, e.g. `reqdesk://app/alert`.
    pub fn routing_key(&self, path: &str) -> String {
        format!("{}://{path}", self.canonical)
    }
}

/// One parsed link. Lives only for the duration of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLink {
    pub routing_key: String,
    pub params: LinkParams,
}

/// Everything before the first `?`. A missing `?`, or one in first position,
/// leaves the whole string as the key.
fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(idx) if idx > 0 => &url[..idx],
        _ => url,
    }
}

/// Parse `url` into a routing key and parameters.
///
/// Returns `None` (after logging) when the string is not a URL at all. The
/// routing key is cut from the raw string rather than the normalized URL, so
/// it matches exactly what the sender wrote.
pub fn parse_deep_link(url: &str, scheme: &LinkScheme) -> Option<DeepLink> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::info!(
                "[deeplink] Invalid args, expected {}://x/y/z: {url} ({e})",
                scheme.canonical
            );
            return None;
        }
    };

    let mut routing_key = strip_query(url).to_string();
    if scheme.mode.is_development() {
        routing_key = routing_key.replacen(
            &format!("{}://", scheme.development),
            &format!("{}://", scheme.canonical),
            1,
        );
    }

    let params: LinkParams = parsed.query_pairs().into_owned().collect();

    Some(DeepLink {
        routing_key,
        params,
    })
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// The closed set of links the application understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkAction {
    Alert,
    AuthLogin,
    Import,
    PluginInstall,
    PluginTheme,
    GitHubAuthenticate,
    GitLabAuthenticate,
    AuthFinish,
}

impl LinkAction {
    pub const ALL: [LinkAction; 8] = [
        LinkAction::Alert,
        LinkAction::AuthLogin,
        LinkAction::Import,
        LinkAction::PluginInstall,
        LinkAction::PluginTheme,
        LinkAction::GitHubAuthenticate,
        LinkAction::GitLabAuthenticate,
        LinkAction::AuthFinish,
    ];

    /// Authority and path of the action, without scheme.
    pub fn path(self) -> &'static str {
        match self {
            LinkAction::Alert => "app/alert",
            LinkAction::AuthLogin => "app/auth/login",
            LinkAction::Import => "app/import",
            LinkAction::PluginInstall => "plugins/install",
            LinkAction::PluginTheme => "plugins/theme",
            LinkAction::GitHubAuthenticate => "oauth/github/authenticate",
            LinkAction::GitLabAuthenticate => "oauth/gitlab/authenticate",
            LinkAction::AuthFinish => "app/auth/finish",
        }
    }

    pub fn handler(self) -> Arc<dyn LinkHandler> {
        match self {
            LinkAction::Alert => Arc::new(AlertHandler),
            LinkAction::AuthLogin => Arc::new(AuthLoginHandler),
            LinkAction::Import => Arc::new(ImportHandler),
            LinkAction::PluginInstall => Arc::new(PluginInstallHandler),
            LinkAction::PluginTheme => Arc::new(PluginThemeHandler),
            LinkAction::GitHubAuthenticate => Arc::new(OAuthFinishHandler::new(GitProvider::GitHub)),
            LinkAction::GitLabAuthenticate => Arc::new(OAuthFinishHandler::new(GitProvider::GitLab)),
            LinkAction::AuthFinish => Arc::new(AuthFinishHandler),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Result of one [`Dispatcher::dispatch`] call.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The string was not a URL; nothing ran.
    Invalid,
    /// No handler for this routing key; nothing ran.
    Unknown { routing_key: String },
    /// A handler ran. `task` is set when it spawned asynchronous work.
    Handled {
        routing_key: String,
        task: Option<JoinHandle<()>>,
    },
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled { .. })
    }

    /// Wait for the spawned handler task, if any. A panicking handler is logged.
    pub async fn finished(self) {
        let DispatchOutcome::Handled {
            routing_key,
            task: Some(task),
        } = self
        else {
            return;
        };
        if let Err(e) = task.await {
            tracing::error!("[deeplink] Handler for {routing_key} failed: {e}");
        }
    }
}

pub struct Dispatcher {
    scheme: LinkScheme,
    routes: HashMap<String, Arc<dyn LinkHandler>>,
    caps: Capabilities,
    runtime: Handle,
}

impl Dispatcher {
    /// Build a dispatcher with every [`LinkAction`] registered.
    /// Asynchronous handler work is spawned on `runtime`.
    pub fn new(scheme: LinkScheme, caps: Capabilities, runtime: Handle) -> Self {
        let mut dispatcher = Self {
            scheme,
            routes: HashMap::new(),
            caps,
            runtime,
        };
        for action in LinkAction::ALL {
            dispatcher.register(action.path(), action.handler());
        }
        dispatcher
    }

    /// Route `path` (authority and path, no scheme) to `handler`, replacing
    /// and returning any previous handler for it.
    pub fn register(
        &mut self,
        path: &str,
        handler: Arc<dyn LinkHandler>,
    ) -> Option<Arc<dyn LinkHandler>> {
        self.routes.insert(self.scheme.routing_key(path), handler)
    }

    pub fn scheme(&self) -> &LinkScheme {
        &self.scheme
    }

    /// Route one incoming URL. Never panics and never returns an error:
    /// malformed and unknown links are logged and ignored.
    pub fn dispatch(&self, url: &str) -> DispatchOutcome {
        let Some(link) = parse_deep_link(url, &self.scheme) else {
            return DispatchOutcome::Invalid;
        };

        let Some(handler) = self.routes.get(&link.routing_key) else {
            tracing::info!("[deeplink] Unknown deep link: {url}");
            return DispatchOutcome::Unknown {
                routing_key: link.routing_key,
            };
        };

        tracing::debug!("[deeplink] Handling {}", link.routing_key);
        let task = handler
            .handle(&link.params, &self.caps)
            .map(|work| self.runtime.spawn(work));

        DispatchOutcome::Handled {
            routing_key: link.routing_key,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{Effect, RecordingHost};
    use super::*;
    use crate::host::{
        AlertDialog, AskPrompt, ErrorDialog, Method, SettingsTab, Submission,
    };
    use serde_json::json;

    fn scheme(mode: BuildMode) -> LinkScheme {
        LinkScheme::new("reqdesk", "reqdeskdev", mode)
    }

    fn dispatcher(host: &Arc<RecordingHost>, mode: BuildMode) -> Dispatcher {
        Dispatcher::new(scheme(mode), host.capabilities(), Handle::current())
    }

    // -- Parsing --

    #[test]
    fn strip_query_cases() {
        assert_eq!(strip_query("reqdesk://app/alert?title=A"), "reqdesk://app/alert");
        assert_eq!(strip_query("reqdesk://app/alert"), "reqdesk://app/alert");
        assert_eq!(strip_query("reqdesk://app/alert?"), "reqdesk://app/alert");
        assert_eq!(strip_query("?x=1"), "?x=1");
        assert_eq!(strip_query("a://b?c?d"), "a://b");
    }

    #[test]
    fn parse_splits_routing_key_and_params() {
        let link = parse_deep_link(
            "reqdesk://app/alert?title=A&message=B",
            &scheme(BuildMode::Production),
        )
        .unwrap();
        assert_eq!(link.routing_key, "reqdesk://app/alert");
        assert_eq!(
            link.params,
            LinkParams::from([
                ("title".to_string(), "A".to_string()),
                ("message".to_string(), "B".to_string()),
            ])
        );
    }

    #[test]
    fn parse_decodes_params_and_keeps_last_duplicate() {
        let link = parse_deep_link(
            "reqdesk://app/alert?title=Hello%20there&message=a+b&title=Second",
            &scheme(BuildMode::Production),
        )
        .unwrap();
        assert_eq!(link.params["title"], "Second");
        assert_eq!(link.params["message"], "a b");
    }

    #[test]
    fn parse_rejects_non_urls() {
        let s = scheme(BuildMode::Production);
        assert!(parse_deep_link("not a url", &s).is_none());
        assert!(parse_deep_link("", &s).is_none());
        assert!(parse_deep_link("/app/alert?title=x", &s).is_none());
    }

    #[test]
    fn dev_scheme_rewritten_only_in_development() {
        let url = "reqdeskdev://app/import?uri=x";
        let dev = parse_deep_link(url, &scheme(BuildMode::Development)).unwrap();
        assert_eq!(dev.routing_key, "reqdesk://app/import");

        let prod = parse_deep_link(url, &scheme(BuildMode::Production)).unwrap();
        assert_eq!(prod.routing_key, "reqdeskdev://app/import");
    }

    #[test]
    fn every_action_has_a_distinct_path() {
        let mut paths: Vec<_> = LinkAction::ALL.iter().map(|a| a.path()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    // -- Dispatch --

    #[tokio::test]
    async fn invalid_url_has_no_effect() {
        let host = RecordingHost::new().shared();
        let outcome = dispatcher(&host, BuildMode::Production).dispatch("::not a link::");
        assert!(matches!(outcome, DispatchOutcome::Invalid));
        assert!(host.effects().is_empty());
    }

    #[tokio::test]
    async fn unknown_action_has_no_effect() {
        let host = RecordingHost::new().shared();
        let outcome = dispatcher(&host, BuildMode::Production).dispatch("reqdesk://app/unknown?x=1");
        match outcome {
            DispatchOutcome::Unknown { routing_key } => {
                assert_eq!(routing_key, "reqdesk://app/unknown")
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
        assert!(host.effects().is_empty());
    }

    #[tokio::test]
    async fn matching_is_exact() {
        let host = RecordingHost::new().shared();
        let d = dispatcher(&host, BuildMode::Production);
        assert!(!d.dispatch("reqdesk://app/alert/").is_handled());
        assert!(!d.dispatch("reqdesk://APP/alert").is_handled());
        assert!(!d.dispatch("other://app/alert").is_handled());
        assert!(host.effects().is_empty());
    }

    #[tokio::test]
    async fn alert_shows_dialog() {
        let host = RecordingHost::new().shared();
        let outcome =
            dispatcher(&host, BuildMode::Production).dispatch("reqdesk://app/alert?title=A&message=B");
        assert!(outcome.is_handled());
        outcome.finished().await;
        assert_eq!(
            host.effects(),
            vec![Effect::Alert(AlertDialog {
                title: Some("A".into()),
                message: Some("B".into()),
            })]
        );
    }

    #[tokio::test]
    async fn alert_without_params_passes_none() {
        let host = RecordingHost::new().shared();
        dispatcher(&host, BuildMode::Production)
            .dispatch("reqdesk://app/alert")
            .finished()
            .await;
        assert_eq!(
            host.effects(),
            vec![Effect::Alert(AlertDialog {
                title: None,
                message: None
            })]
        );
    }

    #[tokio::test]
    async fn auth_login_submits_logout() {
        let host = RecordingHost::new().shared();
        dispatcher(&host, BuildMode::Production)
            .dispatch("reqdesk://app/auth/login")
            .finished()
            .await;
        assert_eq!(
            host.effects(),
            vec![Effect::Submit(Submission {
                action: "/auth/logout".into(),
                method: Method::Post,
                enc_type: None,
                body: json!({}),
            })]
        );
    }

    #[tokio::test]
    async fn import_records_uri() {
        let host = RecordingHost::new().shared();
        dispatcher(&host, BuildMode::Production)
            .dispatch("reqdesk://app/import?uri=https%3A%2F%2Fexample.com%2Fspec.yaml")
            .finished()
            .await;
        assert_eq!(
            host.effects(),
            vec![Effect::Import(Some("https://example.com/spec.yaml".into()))]
        );
    }

    #[tokio::test]
    async fn plugin_install_confirmed_opens_plugin_settings() {
        let host = RecordingHost::new().shared();
        dispatcher(&host, BuildMode::Production)
            .dispatch("reqdesk://plugins/install?name=reqdesk-plugin-foo")
            .finished()
            .await;
        assert_eq!(
            host.effects(),
            vec![
                Effect::Ask(AskPrompt {
                    title: "Plugin Install".into(),
                    message: "Do you want to install reqdesk-plugin-foo?".into(),
                    yes_text: "Install".into(),
                    no_text: "Cancel".into(),
                }),
                Effect::Install("reqdesk-plugin-foo".into()),
                Effect::Settings(SettingsTab::Plugins),
            ]
        );
    }

    #[tokio::test]
    async fn plugin_install_declined_does_nothing_more() {
        let host = RecordingHost::new().answering(false).shared();
        dispatcher(&host, BuildMode::Production)
            .dispatch("reqdesk://plugins/install?name=foo")
            .finished()
            .await;
        let effects = host.effects();
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::Ask(_)));
    }

    #[tokio::test]
    async fn plugin_install_failure_shows_error_not_settings() {
        let host = RecordingHost::new().failing_install("npm unreachable").shared();
        dispatcher(&host, BuildMode::Production)
            .dispatch("reqdesk://plugins/install?name=foo")
            .finished()
            .await;
        let effects = host.effects();
        assert_eq!(
            effects.last(),
            Some(&Effect::Error(ErrorDialog {
                title: "Plugin Install".into(),
                message: "Failed to install plugin".into(),
                error: Some("npm unreachable".into()),
            }))
        );
        assert!(!effects.iter().any(|e| matches!(e, Effect::Settings(_))));
    }

    #[tokio::test]
    async fn theme_install_runs_steps_in_order() {
        let host = RecordingHost::new().shared();
        let theme = urlencoding::encode(r#"{"name":"midnight","displayName":"Midnight"}"#);
        dispatcher(&host, BuildMode::Production)
            .dispatch(&format!("reqdesk://plugins/theme?theme={theme}"))
            .finished()
            .await;

        let effects = host.effects();
        assert_eq!(effects.len(), 6, "{effects:?}");
        assert_eq!(
            effects[0],
            Effect::Ask(AskPrompt {
                title: "Install Theme".into(),
                message: "Do you want to install Midnight?".into(),
                yes_text: "Install".into(),
                no_text: "Cancel".into(),
            })
        );
        match &effects[1] {
            Effect::CreatePlugin {
                name,
                version,
                main_js,
            } => {
                assert_eq!(name, "theme-midnight");
                assert_eq!(version, "0.0.1");
                assert!(main_js.starts_with("module.exports.themes = [{"));
                assert!(main_js.ends_with("}];"));
                assert!(main_js.contains("\"name\": \"midnight\""));
            }
            other => panic!("expected CreatePlugin, got {other:?}"),
        }
        assert_eq!(effects[2], Effect::SettingsUpdate(Some("midnight".into())));
        assert_eq!(effects[3], Effect::Reload);
        assert_eq!(effects[4], Effect::SetTheme("midnight".into()));
        assert_eq!(effects[5], Effect::Settings(SettingsTab::Themes));
    }

    #[tokio::test]
    async fn theme_with_malformed_json_has_no_effect() {
        let host = RecordingHost::new().shared();
        let outcome = dispatcher(&host, BuildMode::Production)
            .dispatch("reqdesk://plugins/theme?theme=%7Bnot-json");
        match &outcome {
            DispatchOutcome::Handled { task, .. } => assert!(task.is_none()),
            other => panic!("expected Handled, got {other:?}"),
        }
        outcome.finished().await;
        assert!(host.effects().is_empty());
    }

    #[tokio::test]
    async fn theme_install_declined_only_asks() {
        let host = RecordingHost::new().answering(false).shared();
        let theme = urlencoding::encode(r#"{"name":"midnight","displayName":"Midnight"}"#);
        dispatcher(&host, BuildMode::Production)
            .dispatch(&format!("reqdesk://plugins/theme?theme={theme}"))
            .finished()
            .await;

        let effects = host.effects();
        assert_eq!(effects.len(), 1, "{effects:?}");
        assert!(matches!(effects[0], Effect::Ask(_)));
    }

    #[tokio::test]
    async fn theme_step_failure_keeps_earlier_steps_silently() {
        for (step, expected_len) in [("create", 2), ("reload", 4), ("set_theme", 5)] {
            let host = RecordingHost::new()
                .failing_plugin_step(step, "disk full")
                .shared();
            let theme = urlencoding::encode(r#"{"name":"midnight","displayName":"Midnight"}"#);
            dispatcher(&host, BuildMode::Production)
                .dispatch(&format!("reqdesk://plugins/theme?theme={theme}"))
                .finished()
                .await;

            let effects = host.effects();
            assert_eq!(effects.len(), expected_len, "{step}: {effects:?}");
            assert!(matches!(effects[1], Effect::CreatePlugin { .. }));
            assert!(
                !effects
                    .iter()
                    .any(|e| matches!(e, Effect::Error(_) | Effect::Settings(_))),
                "{step}: {effects:?}"
            );
        }
    }

    #[tokio::test]
    async fn oauth_links_exchange_code_with_their_provider() {
        for (provider, path) in [
            ("github", "oauth/github/authenticate"),
            ("gitlab", "oauth/gitlab/authenticate"),
        ] {
            let host = RecordingHost::new().shared();
            dispatcher(&host, BuildMode::Production)
                .dispatch(&format!("reqdesk://{path}?code=abc&state=xyz"))
                .finished()
                .await;
            assert_eq!(
                host.effects(),
                vec![Effect::Exchange {
                    provider,
                    code: "abc".into(),
                    state: "xyz".into(),
                }]
            );
        }
    }

    #[tokio::test]
    async fn oauth_failures_show_provider_titled_errors() {
        for (provider, path, title) in [
            ("github", "oauth/github/authenticate", "Error authorizing GitHub"),
            ("gitlab", "oauth/gitlab/authenticate", "Error authorizing GitLab"),
        ] {
            let host = RecordingHost::new()
                .failing_exchange(provider, "bad_verification_code")
                .shared();
            dispatcher(&host, BuildMode::Production)
                .dispatch(&format!("reqdesk://{path}?code=c&state=s"))
                .finished()
                .await;

            let effects = host.effects();
            assert_eq!(
                effects,
                vec![
                    Effect::Exchange {
                        provider,
                        code: "c".into(),
                        state: "s".into(),
                    },
                    Effect::Error(ErrorDialog {
                        title: title.into(),
                        message: "bad_verification_code".into(),
                        error: Some("bad_verification_code".into()),
                    }),
                ]
            );
            assert!(!effects.iter().any(|e| matches!(e, Effect::Submit(_))));
        }
    }

    #[tokio::test]
    async fn auth_finish_submits_code_as_json() {
        let host = RecordingHost::new().shared();
        dispatcher(&host, BuildMode::Production)
            .dispatch("reqdesk://app/auth/finish?box=sealed-box")
            .finished()
            .await;
        assert_eq!(
            host.effects(),
            vec![Effect::Submit(Submission {
                action: "/auth/authorize".into(),
                method: Method::Post,
                enc_type: Some("application/json".into()),
                body: json!({"code": "sealed-box"}),
            })]
        );
    }

    #[tokio::test]
    async fn dev_scheme_routes_only_in_development() {
        let dev_host = RecordingHost::new().shared();
        let outcome = dispatcher(&dev_host, BuildMode::Development)
            .dispatch("reqdeskdev://app/alert?title=A&message=B");
        assert!(outcome.is_handled());
        outcome.finished().await;
        assert_eq!(dev_host.effects().len(), 1);

        let prod_host = RecordingHost::new().shared();
        let outcome = dispatcher(&prod_host, BuildMode::Production)
            .dispatch("reqdeskdev://app/alert?title=A&message=B");
        assert!(matches!(outcome, DispatchOutcome::Unknown { .. }));
        assert!(prod_host.effects().is_empty());
    }

    #[tokio::test]
    async fn canonical_scheme_still_routes_in_development() {
        let host = RecordingHost::new().shared();
        let outcome =
            dispatcher(&host, BuildMode::Development).dispatch("reqdesk://app/auth/login");
        assert!(outcome.is_handled());
    }

    #[tokio::test]
    async fn dispatch_does_not_wait_for_handlers() {
        let host = RecordingHost::new().gated().shared();
        let d = dispatcher(&host, BuildMode::Production);

        let first = d.dispatch("reqdesk://plugins/install?name=one");
        let second = d.dispatch("reqdesk://plugins/install?name=two");
        assert!(first.is_handled() && second.is_handled());

        // Both prompts are pending; neither install happened yet
        tokio::task::yield_now().await;
        assert!(!host.effects().iter().any(|e| matches!(e, Effect::Install(_))));

        host.release(2);
        first.finished().await;
        second.finished().await;

        let installs: Vec<_> = host
            .effects()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Install(name) => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(installs.len(), 2);
        assert!(installs.contains(&"one".to_string()));
        assert!(installs.contains(&"two".to_string()));
    }

    #[tokio::test]
    async fn custom_handler_can_be_registered() {
        struct Ping;
        impl LinkHandler for Ping {
            fn handle(
                &self,
                params: &LinkParams,
                caps: &Capabilities,
            ) -> Option<futures_util::future::BoxFuture<'static, ()>> {
                caps.import.set_import_uri(params.get("to").cloned());
                None
            }
        }

        let host = RecordingHost::new().shared();
        let mut d = dispatcher(&host, BuildMode::Production);
        assert!(d.register("app/ping", Arc::new(Ping)).is_none());
        d.dispatch("reqdesk://app/ping?to=here").finished().await;
        assert_eq!(host.effects(), vec![Effect::Import(Some("here".into()))]);
    }
}
