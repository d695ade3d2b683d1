mod player;
mod source;
mod story;
mod tui;


use std::env;
use std::ffi::OsString;

use anyhow::{Context, Result, bail};
use chrono::Utc;

use crate::cli::{Cli, Command};
use crate::db::Database;
use crate::paths::database_file_path;

use self::source::{FeedApiSource, StorySource, resolve_api_base_url};
use self::story::{format_recency, roster_order, truncate};

pub fn run(cli: Cli) -> Result<()> {
    let db = open_db()?;
    let viewer = resolve_viewer_handle(env::var_os("STORYDECK_VIEWER"))?;
    let source = FeedApiSource::new(resolve_api_base_url());

    match cli.command {
        Some(Command::List) => run_list(&db, &source, &viewer)?,
        Some(Command::View { author, item }) => {
            tui::run_tui(&db, source, &viewer, author.as_deref(), item.as_deref())?;
        }
        None => tui::run_tui(&db, source, &viewer, None, None)?,
    }

    Ok(())
}

fn resolve_viewer_handle(env_value: Option<OsString>) -> Result<String> {
    match env_value {
        Some(value) if !value.is_empty() => Ok(value.to_string_lossy().trim().to_string()),
        _ => bail!("STORYDECK_VIEWER is not set; export your feed handle first"),
    }
}

fn run_list(db: &Database, source: &impl StorySource, viewer: &str) -> Result<()> {
    let feed = source.fetch_groups(viewer)?;
    for warning in &feed.warnings {
        eprintln!("Warning: {warning}");
    }
    if feed.groups.is_empty() {
        println!("No active stories in the feed.");
        return Ok(());
    }

    let viewed = db.viewed_item_ids()?;
    let now = Utc::now();
    println!(
        "{:<30} {:<9} {:<8} {:<20}",
        "AUTHOR", "STORIES", "UNSEEN", "ACTIVITY"
    );
    for index in roster_order(&feed.groups) {
        let group = &feed.groups[index];
        let unseen = group
            .items
            .iter()
            .filter(|item| !viewed.contains(&item.id))
            .count();
        let activity = group
            .latest_created_at()
            .map(|latest| format_recency(latest, now))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<30} {:<9} {:<8} {:<20}",
            truncate(&group.author_handle, 30),
            group.items.len(),
            unseen,
            activity
        );
    }
    Ok(())
}

fn open_db() -> Result<Database> {
    let db_path = database_file_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    db.prune_stale_views()
        .context("failed to prune stale view-log rows")?;
    Ok(db)
}
