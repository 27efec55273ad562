//! Confirmation prompts

use super::context::UiContext;
use crate::error::{BoxerError, BoxerResult};

/// Ask a yes/no question
///
/// Auto-yes answers `true`; a non-interactive context answers `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> BoxerResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    tokio::task::spawn_blocking(move || cliclack::confirm(&message).initial_value(default).interact())
        .await
        .map_err(|e| BoxerError::io("prompt task", std::io::Error::other(e)))?
        .map_err(|e| BoxerError::io("reading confirmation", e))
}
