//! Plain script functions
//!
//! These bypass the cache entirely: they never commit and never advance
//! the build state (apart from `inside`, which scopes the `run` directory).

use crate::script::SharedBuilder;
use mlua::{Function, Lua, Result as LuaResult};

pub(crate) fn register(lua: &Lua, builder: &SharedBuilder) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set(
        "getenv",
        lua.create_function(|_, name: String| Ok(std::env::var(name).ok()))?,
    )?;

    let shared = builder.clone();
    globals.set(
        "read",
        lua.create_async_function(move |_, path: String| {
            let builder = shared.clone();
            async move {
                let full = builder.lock().await.context_dir().join(&path);
                tokio::fs::read_to_string(&full).await.map_err(|e| {
                    mlua::Error::runtime(format!("read({}): {}", full.display(), e))
                })
            }
        })?,
    )?;

    let shared = builder.clone();
    globals.set(
        "inside",
        lua.create_async_function(move |_, (dir, body): (String, Function)| {
            let builder = shared.clone();
            async move {
                let previous = builder.lock().await.set_inside(Some(dir));
                let result = body.call_async::<()>(()).await;
                builder.lock().await.set_inside(previous);
                result
            }
        })?,
    )?;

    let shared = builder.clone();
    globals.set(
        "getuid",
        lua.create_async_function(move |_, user: String| {
            let builder = shared.clone();
            async move {
                let argv = vec!["id".to_string(), "-u".to_string(), user.clone()];
                let output = capture(&builder, "getuid", argv).await?;
                parse_uid(&output)
                    .ok_or_else(|| mlua::Error::runtime(format!("getuid({}): unexpected output {:?}", user, output)))
            }
        })?,
    )?;

    let shared = builder.clone();
    globals.set(
        "getgid",
        lua.create_async_function(move |_, group: String| {
            let builder = shared.clone();
            async move {
                let argv = vec!["getent".to_string(), "group".to_string(), group.clone()];
                let output = capture(&builder, "getgid", argv).await?;
                parse_group_entry(&output)
                    .ok_or_else(|| mlua::Error::runtime(format!("getgid({}): unexpected output {:?}", group, output)))
            }
        })?,
    )?;

    let shared = builder.clone();
    globals.set(
        "image_id",
        lua.create_async_function(move |_, ()| {
            let builder = shared.clone();
            async move { Ok(builder.lock().await.image().map(|i| i.to_string())) }
        })?,
    )?;

    Ok(())
}

/// Run `argv` in a throwaway container of the current image
async fn capture(builder: &SharedBuilder, function: &str, argv: Vec<String>) -> LuaResult<String> {
    let builder = builder.lock().await;
    let state = builder.state().clone();
    let Some(image) = state.image.clone() else {
        return Err(mlua::Error::runtime(format!(
            "{}: no base image; call from() first",
            function
        )));
    };

    builder
        .lifecycle()
        .capture(&image, &state, argv)
        .await
        .map_err(|e| mlua::Error::runtime(format!("{}: {}", function, e)))
}

fn parse_uid(output: &str) -> Option<i64> {
    output.lines().last()?.trim().parse().ok()
}

/// `name:password:gid:members`
fn parse_group_entry(output: &str) -> Option<i64> {
    output.lines().last()?.split(':').nth(2)?.trim().parse().ok()
}
