use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api;
use crate::config;
use crate::data::{
    self, AuthService, CommentService, FeedService, PostService,
};
use crate::session;
use crate::storage;
use crate::tags;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let config_path = config::default_path();
    let display_path = friendly_path(config_path.as_ref());

    let store =
        Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);

    let user_agent = if cfg.api.user_agent.trim().is_empty() {
        format!("tarmeez-tui/{}", crate::VERSION)
    } else {
        cfg.api.user_agent.clone()
    };
    let client = Arc::new(
        api::Client::new(api::ClientConfig {
            user_agent,
            base_url: Some(cfg.api.base_url.clone()),
            timeout: Some(cfg.api.timeout),
            http_client: None,
        })
        .context("create api client")?,
    );

    let session_manager = Arc::new(session::Manager::new(store.clone()));
    session_manager
        .load_existing()
        .context("restore saved session")?;

    let feed_service: Arc<dyn FeedService> =
        Arc::new(data::TarmeezFeedService::new(client.clone()));
    let post_service: Arc<dyn PostService> =
        Arc::new(data::TarmeezPostService::new(client.clone()));
    let comment_service: Arc<dyn CommentService> =
        Arc::new(data::TarmeezCommentService::new(client.clone()));
    let auth_service: Arc<dyn AuthService> = Arc::new(data::TarmeezAuthService::new(client));

    let enricher = Arc::new(tags::Enricher::new(
        post_service.clone(),
        cfg.feed.tag_workers,
    ));

    let status = match session_manager.current() {
        Some(session) => format!(
            "Welcome back, @{}. Press j/k to scroll, n to post, q to quit.",
            session.user.username
        ),
        None => "Browsing as a guest. Press l to log in, j/k to scroll, q to quit.".to_string(),
    };

    let options = ui::Options {
        status_message: status,
        feed_service,
        post_service,
        comment_service,
        auth_service,
        session_manager,
        enricher,
        config_path: display_path,
        theme: cfg.ui.theme.clone(),
    };

    let mut model = ui::Model::new(options);
    model.run()?;

    Ok(())
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/tarmeez-tui/config.yaml".to_string()
    }
}
