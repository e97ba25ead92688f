mod config;
mod server;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use known_core::blog::BlogIndex;
use known_core::posts::{CmsPostSource, CompositeSource, FsPostSource, PostSource, PreviewMode};
use known_core::store::MemoryStore;

use crate::config::Config;
use crate::server::Server;
use crate::session::MemorySessions;

#[derive(Parser, Debug)]
#[clap(name = "known-server", about = "Note organizer and markdown blog server")]
struct Args {
    /// Path to the TOML config file. Missing file means built-in defaults.
    #[clap(long, env = "KNOWN_CONFIG", default_value = "known.toml")]
    config: PathBuf,

    /// Override the configured listen address.
    #[clap(long, env = "KNOWN_LISTEN")]
    listen: Option<String>,

    /// Override the configured posts directory.
    #[clap(long, env = "KNOWN_POSTS_DIR")]
    posts_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        info!(path = %args.config.display(), "no config file, using defaults");
        Config::default()
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(posts_dir) = args.posts_dir {
        config.posts_dir = posts_dir;
    }

    let preview = PreviewMode::new();
    let mut sources: Vec<Arc<dyn PostSource>> =
        vec![Arc::new(FsPostSource::new(config.posts_dir.clone()))];
    if let Some(url) = &config.cms_url {
        let cms = CmsPostSource::fetch(url, preview.clone())
            .await
            .with_context(|| format!("fetching cms posts from {url}"))?;
        sources.push(Arc::new(cms));
    }
    let blog = BlogIndex::new(CompositeSource::new(sources), config.prerender)
        .with_preview(preview.clone());
    match blog.warm().await {
        Ok(count) => info!(count, "pre-rendered blog posts"),
        // A missing posts dir shouldn't keep the app pages down.
        Err(err) => warn!(error = %err, "blog warm-up failed, continuing without pre-render"),
    }

    let store = Arc::new(MemoryStore::new());
    let sessions = MemorySessions::new();
    let dev_token = sessions.issue("dev-user");
    info!(token = %dev_token, "issued development session token");

    let server = Arc::new(Server::new(
        store.clone(),
        store,
        blog,
        Arc::new(sessions),
        preview,
        config.store_timeout(),
    ));

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, server.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install shutdown handler");
        return;
    }
    info!("shutting down");
}
