//! Lua script adapter
//!
//! Exposes every verb in the verb table as a global Lua function routed
//! through the [`Builder`], plus the plain functions in [`functions`].
//!
//! # Failure handling
//!
//! The first failing verb records its error and every later verb call fails
//! immediately, even if the script catches the first error with `pcall`.
//! The recorded error, not the Lua wrapper around it, is what the build
//! returns.
//!
//! # Lifetime
//!
//! The Lua state owns the builder. Dropping a [`ScriptEngine`] closes the
//! state and with it the builder, its cache handle, and its runtime handle.

mod convert;
mod functions;

use crate::build::{BuildOutput, Builder};
use crate::error::{BoxerError, BoxerResult};
use mlua::{Lua, Value, Variadic};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub(crate) type SharedBuilder = Arc<Mutex<Builder>>;
type FailureSlot = Rc<RefCell<Option<BoxerError>>>;

/// A Lua state wired to one build
pub struct ScriptEngine {
    lua: Lua,
    builder: SharedBuilder,
    failure: FailureSlot,
}

impl ScriptEngine {
    pub fn new(builder: Builder) -> BoxerResult<Self> {
        let engine = Self {
            lua: Lua::new(),
            builder: Arc::new(Mutex::new(builder)),
            failure: Rc::new(RefCell::new(None)),
        };

        engine.register_verbs().map_err(script_error)?;
        functions::register(&engine.lua, &engine.builder).map_err(script_error)?;

        Ok(engine)
    }

    fn register_verbs(&self) -> mlua::Result<()> {
        let globals = self.lua.globals();

        for verb in crate::build::VERB_TABLE {
            let name = verb.name;
            let builder = self.builder.clone();
            let failure = self.failure.clone();

            let function = self
                .lua
                .create_async_function(move |_, values: Variadic<Value>| {
                    let builder = builder.clone();
                    let failure = failure.clone();
                    async move {
                        if failure.borrow().is_some() {
                            return Err(mlua::Error::runtime(format!(
                                "{}: build already failed",
                                name
                            )));
                        }

                        let result = match convert::to_args(name, &values) {
                            Ok(args) => builder.lock().await.dispatch(name, &args).await,
                            Err(e) => Err(e),
                        };

                        result.map(|_| ()).map_err(|e| {
                            let message = e.to_string();
                            let mut slot = failure.borrow_mut();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            mlua::Error::runtime(message)
                        })
                    }
                })?;

            globals.set(name, function)?;
        }

        debug!("Registered {} verbs", crate::build::VERB_TABLE.len());
        Ok(())
    }

    /// Run a script chunk to completion
    pub async fn exec(&self, source: &str, chunk_name: &str) -> BoxerResult<()> {
        let result = self
            .lua
            .load(source)
            .set_name(chunk_name)
            .exec_async()
            .await;

        if let Some(failure) = self.failure.borrow_mut().take() {
            return Err(failure);
        }

        result.map_err(script_error)
    }

    /// The artifact produced so far
    pub async fn output(&self) -> BuildOutput {
        self.builder.lock().await.output()
    }
}

fn script_error(e: mlua::Error) -> BoxerError {
    BoxerError::Script(e.to_string())
}

/// Run `source` against `builder`, releasing the script engine on every path
pub async fn run_script(builder: Builder, source: &str, chunk_name: &str) -> BoxerResult<BuildOutput> {
    let engine = ScriptEngine::new(builder)?;
    engine.exec(source, chunk_name).await?;
    Ok(engine.output().await)
}
