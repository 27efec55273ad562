//! Build command - run a script and print the resulting image id

use crate::build::{
    BuildOptions, BuildOutput, Builder, JournalObserver, MultiObserver, StepObserver,
    TracingObserver,
};
use crate::cache::{CachePolicy, CacheStore};
use crate::cli::args::BuildArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::create_runtime;
use crate::script::run_script;
use crate::ui::{self, UiContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// A loaded build script
#[derive(Debug)]
struct Script {
    source: String,
    chunk_name: String,
    context_dir: PathBuf,
}

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> BoxerResult<()> {
    let ctx = UiContext::detect();
    let script = load_script(args.script.as_deref()).await?;

    let runtime = create_runtime(config);
    runtime.ensure_ready().await?;
    debug!("Using {} runtime", runtime.runtime_name());

    let no_cache = args.no_cache || config.build.no_cache;
    let policy = CachePolicy::for_build(no_cache, config.build.write_cache_when_disabled);
    let cache_path = args
        .cache
        .clone()
        .unwrap_or_else(|| ConfigManager::cache_path(config));
    let cache = Arc::new(CacheStore::open(&cache_path, policy).await?);
    info!("Cache: {} ({:?})", cache_path.display(), policy);

    let options = BuildOptions {
        step_timeout: step_timeout(args.timeout, config),
        context_dir: script.context_dir,
        observer: observer(args.journal.as_deref()),
    };
    let builder = Builder::new(runtime, cache, options);
    let abort = builder.abort_handle();

    let result = tokio::select! {
        result = run_script(builder, &script.source, &script.chunk_name) => result,
        _ = tokio::signal::ctrl_c() => Err(BoxerError::Aborted),
    };

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            let released = abort.release().await;
            if released > 0 {
                ui::step_warn(&ctx, &format!("Released {} step container(s)", released));
            }
            return Err(e);
        }
    };

    if let Some(path) = &args.manifest {
        write_manifest(path, &output).await?;
        ui::remark(&ctx, &format!("Manifest written to {}", path.display()));
    }

    match &output.image {
        Some(image) => {
            ui::step_ok_detail(&ctx, "Build complete", image.short());
            println!("{}", image);
        }
        None => ui::step_warn_hint(&ctx, "Script produced no image", "Start it with from(...)"),
    }

    Ok(())
}

/// Read the script from a file, or stdin for `None` and `-`
async fn load_script(path: Option<&Path>) -> BoxerResult<Script> {
    match path {
        Some(path) if path != Path::new("-") => {
            if !path.exists() {
                return Err(BoxerError::ScriptNotFound(path.to_path_buf()));
            }
            let source = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| BoxerError::io(format!("reading {}", path.display()), e))?;
            let context_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf();

            Ok(Script {
                source,
                chunk_name: format!("@{}", path.display()),
                context_dir,
            })
        }
        _ => {
            let context_dir = std::env::current_dir()
                .map_err(|e| BoxerError::io("getting current directory", e))?;
            read_piped_script(tokio::io::stdin(), context_dir).await
        }
    }
}

/// Host paths in a piped script resolve against `context_dir`
async fn read_piped_script(
    mut reader: impl AsyncRead + Unpin,
    context_dir: PathBuf,
) -> BoxerResult<Script> {
    let mut source = String::new();
    reader
        .read_to_string(&mut source)
        .await
        .map_err(|e| BoxerError::io("reading script from stdin", e))?;

    Ok(Script {
        source,
        chunk_name: "=stdin".to_string(),
        context_dir,
    })
}

/// `--timeout` wins over config; zero means no deadline
fn step_timeout(flag: Option<u64>, config: &Config) -> Option<Duration> {
    match flag.unwrap_or(config.build.step_timeout_secs) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

fn observer(journal: Option<&Path>) -> Arc<dyn StepObserver> {
    match journal {
        Some(path) => Arc::new(MultiObserver(vec![
            Arc::new(TracingObserver),
            Arc::new(JournalObserver::new(path)),
        ])),
        None => Arc::new(TracingObserver),
    }
}

async fn write_manifest(path: &Path, output: &BuildOutput) -> BoxerResult<()> {
    let json = serde_json::to_string_pretty(output)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| BoxerError::io(format!("writing manifest {}", path.display()), e))
}
