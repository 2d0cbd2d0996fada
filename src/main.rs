use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use stacksync::config::Config;
use stacksync::server::{run_server, AppState};
use stacksync::storage::{ArticleStore, Database};
use stacksync::sync::{Outcome, SyncPipeline, SyncProgress, SyncSummary};
use stacksync::util::{strip_control_chars, truncate_chars};

/// Get the default config file path (~/.config/stacksync/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("stacksync")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "stacksync",
    version,
    about = "Sync a Substack RSS feed into an article store"
)]
struct Args {
    /// Config file (default: ~/.config/stacksync/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the feed and reconcile every item against the store
    Sync {
        /// Feed to sync instead of the configured one
        #[arg(long, value_name = "URL")]
        feed_url: Option<String>,

        /// Scrape each post page and rewrite every stored article
        #[arg(long)]
        full: bool,

        /// Print only the summary, as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the HTTP sync trigger
    Serve {
        /// Address to bind (overrides [server] bind)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// List the most recently published stored articles
    Articles {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env_overrides(|key| std::env::var(key).ok());

    // Storage credential is required by every command
    let database_url = config.database_url()?;
    let db = Database::connect(&database_url)
        .await
        .context("Failed to open article database")?;
    let store: Arc<dyn ArticleStore> = Arc::new(db);

    match args.command {
        Command::Sync {
            feed_url,
            full,
            json,
        } => {
            let feed_url = config.resolve_feed_url(feed_url.as_deref())?;
            let pipeline = SyncPipeline::from_config(&config, store)
                .context("Failed to build HTTP client")?;
            run_sync(&pipeline, &feed_url, full, json).await
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let pipeline = SyncPipeline::from_config(&config, store)
                .context("Failed to build HTTP client")?;
            let state = AppState::new(pipeline, config.feed_url.clone())
                .with_sync_token(config.sync_token());
            if config.sync_token().is_none() {
                tracing::warn!("No sync_token configured, POST /sync is unauthenticated");
            }
            println!("Sync server listening on http://{}", bind);
            run_server(&bind, state).await
        }
        Command::Articles { limit } => list_articles(store.as_ref(), limit).await,
    }
}

async fn run_sync(pipeline: &SyncPipeline, feed_url: &str, full: bool, json: bool) -> Result<()> {
    let summary = if json {
        pipeline.run(feed_url, full, None).await?
    } else {
        let (tx, rx) = mpsc::channel(64);
        let printer = tokio::spawn(print_progress(rx));
        let result = pipeline.run(feed_url, full, Some(&tx)).await;
        drop(tx);
        if let Err(e) = printer.await {
            tracing::debug!(error = %e, "Progress printer task failed");
        }
        result?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

async fn print_progress(mut rx: mpsc::Receiver<SyncProgress>) {
    while let Some(event) = rx.recv().await {
        match event {
            SyncProgress::Started { total, dropped } => {
                if dropped > 0 {
                    println!("Found {} items ({} malformed, skipped)", total, dropped);
                } else {
                    println!("Found {} items", total);
                }
            }
            SyncProgress::Item {
                index,
                total,
                title,
                outcome,
            } => {
                let label = match outcome {
                    Outcome::Inserted => "new",
                    Outcome::Updated => "updated",
                    Outcome::Skipped => "unchanged",
                    Outcome::Errored => "ERROR",
                };
                // Feed titles are untrusted; keep terminal escapes out
                let title = strip_control_chars(&title);
                println!(
                    "[{}/{}] {:<9} {}",
                    index,
                    total,
                    label,
                    truncate_chars(&title, 80)
                );
            }
            SyncProgress::Finished(_) => {}
        }
    }
}

fn print_summary(summary: &SyncSummary) {
    println!();
    println!(
        "Processed {}: {} new, {} updated, {} unchanged, {} errored",
        summary.total_processed,
        summary.new_posts,
        summary.updated_posts,
        summary.skipped,
        summary.errored
    );
}

async fn list_articles(store: &dyn ArticleStore, limit: i64) -> Result<()> {
    let articles = store
        .recent(limit)
        .await
        .context("Failed to read articles")?;

    if articles.is_empty() {
        println!("No articles stored yet");
        return Ok(());
    }

    for article in articles {
        println!(
            "{}  {}",
            article.published_at,
            truncate_chars(&strip_control_chars(&article.title), 80)
        );
        println!("    {}", article.url);
    }
    Ok(())
}
