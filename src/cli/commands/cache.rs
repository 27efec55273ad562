//! Cache command - inspect or clear the step cache

use crate::cache::{CacheEntry, CacheKey, CachePolicy, CacheStore};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::{BoxerError, BoxerResult, ErrorKind};
use crate::ui::{self, UiContext};
use serde::Serialize;
use std::path::Path;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> BoxerResult<()> {
    let path = args
        .cache
        .unwrap_or_else(|| ConfigManager::cache_path(config));

    match args.action {
        CacheAction::List { format } => list_entries(&path, format).await,
        CacheAction::Clear { yes } => {
            let ctx = UiContext::detect().with_auto_yes(yes);
            clear_entries(&ctx, &path).await.map(|_| ())
        }
        CacheAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct EntryJson<'a> {
    key: &'a str,
    image: &'a str,
    created_at: String,
}

async fn list_entries(path: &Path, format: OutputFormat) -> BoxerResult<()> {
    let ctx = UiContext::detect();
    let store = CacheStore::open(path, CachePolicy::enabled()).await?;
    let entries = store.entries().await;

    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                ui::remark(&ctx, "No cached steps");
                return Ok(());
            }
            print!("{}", render_table(&entries));
            ui::key_value(&ctx, "Total", &entries.len().to_string());
            ui::key_value(&ctx, "File", &path.display().to_string());
        }
        OutputFormat::Json => println!("{}", render_json(&entries)?),
        OutputFormat::Plain => {
            for (_, entry) in &entries {
                println!("{}", entry.image);
            }
        }
    }

    Ok(())
}

fn render_table(entries: &[(CacheKey, CacheEntry)]) -> String {
    let mut out = format!("{:<14} {:<14} {:<20}\n", "KEY", "IMAGE", "CREATED");
    out.push_str(&"-".repeat(50));
    out.push('\n');

    for (key, entry) in entries {
        let key = key.as_str();
        out.push_str(&format!(
            "{:<14} {:<14} {:<20}\n",
            &key[..12.min(key.len())],
            entry.image.short(),
            entry.created_at.format("%Y-%m-%d %H:%M")
        ));
    }

    out
}

fn render_json(entries: &[(CacheKey, CacheEntry)]) -> BoxerResult<String> {
    let rows: Vec<EntryJson<'_>> = entries
        .iter()
        .map(|(key, entry)| EntryJson {
            key: key.as_str(),
            image: entry.image.as_str(),
            created_at: entry.created_at.to_rfc3339(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Returns how many entries were removed
///
/// Only the cache file is touched; committed images stay in the runtime.
async fn clear_entries(ctx: &UiContext, path: &Path) -> BoxerResult<usize> {
    let store = match CacheStore::open(path, CachePolicy::enabled()).await {
        Ok(store) => store,
        Err(e) if e.kind() == ErrorKind::Cache => {
            reset_unreadable(ctx, path, &e).await?;
            return Ok(0);
        }
        Err(e) => return Err(e),
    };
    let count = store.entries().await.len();

    if count == 0 {
        ui::step_info(ctx, "Cache is already empty");
        return Ok(0);
    }

    let prompt = format!("Remove {} cached step(s)?", count);
    if !ui::confirm(ctx, &prompt, false).await? {
        ui::step_warn_hint(ctx, "Cache not cleared", "Pass --yes to confirm");
        return Ok(0);
    }

    let removed = store.clear().await?;
    ui::step_ok_detail(ctx, "Cache cleared", &format!("{} entries", removed));
    Ok(removed)
}

/// Overwrite a cache file that cannot be parsed
async fn reset_unreadable(ctx: &UiContext, path: &Path, error: &BoxerError) -> BoxerResult<()> {
    ui::step_warn(ctx, &error.to_string());

    if !ui::confirm(ctx, "Discard the unreadable cache file?", false).await? {
        ui::step_warn_hint(ctx, "Cache not cleared", "Pass --yes to confirm");
        return Ok(());
    }

    CacheStore::reset(path).await?;
    ui::step_ok(ctx, "Cache reset");
    Ok(())
}
