//! Lua value marshalling

use crate::error::{BoxerError, BoxerResult};
use mlua::Value;

/// Convert verb arguments to strings
///
/// Only strings and numbers are accepted.
pub fn to_args(verb: &str, values: &[Value]) -> BoxerResult<Vec<String>> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| to_arg(verb, i + 1, value))
        .collect()
}

fn to_arg(verb: &str, position: usize, value: &Value) -> BoxerResult<String> {
    match value {
        Value::String(s) => match s.to_str() {
            Ok(text) => Ok(String::from(&*text)),
            Err(_) => Err(BoxerError::argument(
                verb,
                format!("argument {} is not valid UTF-8", position),
            )),
        },
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(BoxerError::argument(
            verb,
            format!(
                "argument {} must be a string or number, got {}",
                position,
                other.type_name()
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mlua::Lua;

    #[test]
    fn strings_and_numbers_convert() {
        let lua = Lua::new();
        let values = vec![
            Value::String(lua.create_string("8080/tcp").unwrap()),
            Value::Integer(443),
            Value::Number(1.5),
        ];

        let args = to_args("expose", &values).unwrap();
        assert_eq!(args, vec!["8080/tcp", "443", "1.5"]);
    }

    #[test]
    fn other_types_are_argument_errors() {
        let lua = Lua::new();
        let values = vec![
            Value::String(lua.create_string("ok").unwrap()),
            Value::Table(lua.create_table().unwrap()),
        ];

        let err = to_args("run", &values).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        assert!(err.to_string().contains("argument 2"));
        assert!(err.to_string().contains("table"));

        let err = to_args("run", &[Value::Nil]).unwrap_err();
        assert!(err.to_string().contains("nil"));
    }
}
