/// Deep-link entry point for reqdesk.
/// The OS launches this with one or more `reqdesk://…` URLs as arguments.
/// Dialogs go to stderr, confirmations are read from stdin, and the resulting
/// screen is printed to stdout as JSON.
///
/// `open-link login <github|gitlab>` starts a git provider sign-in and prints
/// the URL to approve it at; the provider's redirect comes back as a deep link.
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqdesk_lib::deeplink::GitProvider;
use reqdesk_lib::host::{
    AlertDialog, AskPrompt, ErrorDialog, ModalService, Navigator, SettingsTab, Submission,
};
use reqdesk_lib::oauth;
use reqdesk_lib::session::FileSession;
use reqdesk_lib::shell::{self, RouteDecision, ScratchPad};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

// --- Console capabilities ---

struct ConsoleModals;

#[async_trait]
impl ModalService for ConsoleModals {
    fn show_alert(&self, dialog: AlertDialog) {
        eprintln!(
            "[alert] {}\n{}",
            dialog.title.unwrap_or_default(),
            dialog.message.unwrap_or_default()
        );
    }

    async fn ask(&self, prompt: AskPrompt) -> bool {
        eprint!(
            "[ask] {}\n{}\n({} = y / {} = n) ",
            prompt.title, prompt.message, prompt.yes_text, prompt.no_text
        );
        let _ = io::stderr().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }

    fn show_settings(&self, tab: SettingsTab) {
        eprintln!("[settings] Opening {tab:?} tab");
    }

    fn show_error(&self, dialog: ErrorDialog) {
        match dialog.error {
            Some(error) => eprintln!("[error] {}\n{}\n{}", dialog.title, dialog.message, error),
            None => eprintln!("[error] {}\n{}", dialog.title, dialog.message),
        }
    }
}

struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn submit(&self, submission: Submission) {
        match serde_json::to_string(&submission) {
            Ok(json) => eprintln!("[navigate] {json}"),
            Err(e) => tracing::warn!("[navigate] Failed to serialize submission: {e}"),
        }
    }
}

// --- Sign-in ---

fn login(config: &reqdesk_lib::AppConfig, provider_key: Option<&str>) -> Result<()> {
    let provider = provider_key
        .and_then(GitProvider::from_key)
        .context("usage: open-link login <github|gitlab>")?;

    let exchange = reqdesk_lib::git_exchange(config, provider);
    let state = exchange.begin().map_err(anyhow::Error::msg)?;
    let url = exchange
        .authorization_url(&state, &oauth::redirect_uri(&config.link_scheme, provider))
        .map_err(anyhow::Error::msg)?;
    println!("{url}");
    Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
    reqdesk_lib::init_tracing();

    let config = reqdesk_lib::config::load_app_config();
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("login") {
        return login(&config, args.get(1).map(String::as_str));
    }

    if let RouteDecision::Redirect(route) = shell::load_route(&FileSession) {
        println!("{}", serde_json::json!({ "redirect": route }));
        return Ok(());
    }

    let caps = reqdesk_lib::desktop_capabilities(
        &config,
        Arc::new(ConsoleModals),
        Arc::new(ConsoleNavigator),
    )
    .map_err(anyhow::Error::msg)
    .context("Failed to open the document store")?;

    let pad = ScratchPad::new(&config, caps, tokio::runtime::Handle::current());

    for url in &args {
        let outcome = pad.open_url(url);
        if !outcome.is_handled() {
            tracing::debug!("[open-link] Ignored {url}");
        }
        outcome.finished().await;
    }

    let surfaces = serde_json::to_string_pretty(&pad.render()).context("Failed to render")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{surfaces}")?;
    Ok(())
}
