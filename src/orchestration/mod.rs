//! Orchestration module for container runtimes
//!
//! Everything the build core needs from a backend goes through
//! [`ContainerRuntime`]. The shipped implementation drives the Podman
//! (or Docker) CLI.

mod factory;
#[cfg(test)]
pub(crate) mod mock;
pub mod podman;
mod runtime;
pub mod types;

pub use factory::create_runtime;
pub use podman::PodmanRuntime;
pub use runtime::ContainerRuntime;
pub use types::{ContainerSpec, ImageConfig, ImageRef};

use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in step error messages.
const STEP_ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of step output for error diagnostics.
///
/// Returns the last `STEP_ERROR_TAIL_LINES` lines so error messages are
/// actionable without being overwhelming.
pub(crate) fn step_error_output(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(STEP_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines. This is a standalone async function
/// (not behind `async_trait`) to avoid lifetime issues with the `dyn Fn`
/// callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let mut all_output = Vec::new();

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return all_output;
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
