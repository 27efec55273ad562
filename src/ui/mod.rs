//! Terminal output for the CLI
//!
//! Interactive terminals get `cliclack` rendering; pipes and CI get plain
//! bracketed status lines. Everything here writes to stderr so that stdout
//! stays machine-readable (`box build` prints only the image id there).

mod context;
mod output;
mod prompts;

pub use context::UiContext;
pub use output::{key_value, remark, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint};
pub use prompts::confirm;
