use std::io::Write;

use indexmap::IndexMap;

use crate::{
    diagnostics::HostError,
    registry::Registry,
    value::{Arity, MapKey, Value, ValueKind},
};

type HostResult = Result<Value, HostError>;

pub fn install(registry: &mut Registry) {
    registry
        .define_native("print", Arity::AtLeast(0), io_print)
        .define_native("println", Arity::AtLeast(0), io_println)
        .define_native("len", Arity::Exact(1), collections_len)
        .define_native("str", Arity::Exact(1), convert_str)
        .define_native("type", Arity::Exact(1), convert_type)
        .define_native("range", Arity::AtLeast(1), collections_range)
        .define_native("push", Arity::Exact(2), collections_push)
        .define_native("keys", Arity::Exact(1), collections_keys)
        .define_native("values", Arity::Exact(1), collections_values)
        .define_native("contains", Arity::Exact(2), collections_contains);
}

fn expect_map<'a>(value: &'a Value, name: &str) -> Result<&'a IndexMap<MapKey, Value>, HostError> {
    value.as_map().ok_or_else(|| {
        HostError::new(format!("`{name}` expected Map but found {}", value.type_name()))
    })
}

fn expect_integer(value: &Value, name: &str) -> Result<i64, HostError> {
    match value.as_number() {
        Some(n) if n.fract() == 0.0 && n.is_finite() => Ok(n as i64),
        Some(n) => Err(HostError::new(format!("`{name}` expected an integer but found {n}"))),
        None => Err(HostError::new(format!(
            "`{name}` expected Number but found {}",
            value.type_name()
        ))),
    }
}

fn write_joined(args: &[Value], newline: bool) -> HostResult {
    let mut out = std::io::stdout().lock();
    let line = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let result = if newline {
        writeln!(out, "{line}")
    } else {
        write!(out, "{line}").and_then(|_| out.flush())
    };
    result.map_err(|err| HostError::new(format!("failed to write to stdout: {err}")))?;
    Ok(Value::nil())
}

fn io_print(args: &[Value]) -> HostResult {
    write_joined(args, false)
}

fn io_println(args: &[Value]) -> HostResult {
    write_joined(args, true)
}

fn collections_len(args: &[Value]) -> HostResult {
    let len = match args[0].kind() {
        ValueKind::String(s) => s.chars().count(),
        ValueKind::List(values) => values.len(),
        ValueKind::Map(map) => map.len(),
        _ => {
            return Err(HostError::new(format!(
                "`len` expected String, List or Map but found {}",
                args[0].type_name()
            )));
        }
    };
    Ok(Value::number(len as f64))
}

fn convert_str(args: &[Value]) -> HostResult {
    Ok(Value::string(args[0].to_string()))
}

fn convert_type(args: &[Value]) -> HostResult {
    Ok(Value::string(args[0].type_name()))
}

/// `range(end)`, `range(start, end)` or `range(start, end, step)`; the end is
/// exclusive.
fn collections_range(args: &[Value]) -> HostResult {
    let (start, end, step) = match args {
        [end] => (0, expect_integer(end, "range")?, 1),
        [start, end] => (
            expect_integer(start, "range")?,
            expect_integer(end, "range")?,
            1,
        ),
        [start, end, step] => (
            expect_integer(start, "range")?,
            expect_integer(end, "range")?,
            expect_integer(step, "range")?,
        ),
        _ => {
            return Err(HostError::new(format!(
                "`range` expected 1 to 3 arguments but received {}",
                args.len()
            )));
        }
    };
    if step == 0 {
        return Err(HostError::new("`range` step must be non-zero"));
    }
    let mut values = Vec::new();
    let mut current = start;
    while (step > 0 && current < end) || (step < 0 && current > end) {
        values.push(Value::number(current as f64));
        current += step;
    }
    Ok(Value::list(values))
}

fn collections_push(args: &[Value]) -> HostResult {
    match args[0].as_list() {
        Some(values) => {
            let mut updated = values.to_vec();
            updated.push(args[1].clone());
            Ok(Value::list(updated))
        }
        None => Err(HostError::new(format!(
            "`push` expected List but found {}",
            args[0].type_name()
        ))),
    }
}

fn collections_keys(args: &[Value]) -> HostResult {
    let map = expect_map(&args[0], "keys")?;
    Ok(Value::list(map.keys().map(MapKey::to_value).collect()))
}

fn collections_values(args: &[Value]) -> HostResult {
    let map = expect_map(&args[0], "values")?;
    Ok(Value::list(map.values().cloned().collect()))
}

fn collections_contains(args: &[Value]) -> HostResult {
    let found = match args[0].kind() {
        ValueKind::List(values) => values.contains(&args[1]),
        ValueKind::Map(map) => match MapKey::from_value(&args[1]) {
            Ok(key) => map.contains_key(&key),
            Err(_) => false,
        },
        ValueKind::String(text) => match args[1].as_str() {
            Some(needle) => text.contains(needle),
            None => {
                return Err(HostError::new(format!(
                    "`contains` on a String expected a String needle but found {}",
                    args[1].type_name()
                )));
            }
        },
        _ => {
            return Err(HostError::new(format!(
                "`contains` expected List, Map or String but found {}",
                args[0].type_name()
            )));
        }
    };
    Ok(Value::bool(found))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[f64]) -> Value {
        Value::list(values.iter().copied().map(Value::number).collect())
    }

    #[test]
    fn range_forms() {
        assert_eq!(
            collections_range(&[Value::number(3.0)]).expect("range"),
            numbers(&[0.0, 1.0, 2.0])
        );
        assert_eq!(
            collections_range(&[Value::number(2.0), Value::number(5.0)]).expect("range"),
            numbers(&[2.0, 3.0, 4.0])
        );
        assert_eq!(
            collections_range(&[Value::number(5.0), Value::number(0.0), Value::number(-2.0)])
                .expect("range"),
            numbers(&[5.0, 3.0, 1.0])
        );
        let err = collections_range(&[Value::number(0.0), Value::number(3.0), Value::number(0.0)])
            .expect_err("zero step");
        assert_eq!(err.message, "`range` step must be non-zero");
        assert!(collections_range(&[Value::number(1.5)]).is_err());
    }

    #[test]
    fn len_counts_characters() {
        assert_eq!(
            collections_len(&[Value::string("héllo")]).expect("len"),
            Value::number(5.0)
        );
        assert!(collections_len(&[Value::nil()]).is_err());
    }

    #[test]
    fn push_returns_a_new_list() {
        let original = numbers(&[1.0]);
        let pushed = collections_push(&[original.clone(), Value::number(2.0)]).expect("push");
        assert_eq!(original, numbers(&[1.0]));
        assert_eq!(pushed, numbers(&[1.0, 2.0]));
    }

    #[test]
    fn contains_by_collection() {
        let list = numbers(&[1.0, 2.0]);
        assert_eq!(
            collections_contains(&[list, Value::number(2.0)]).expect("contains"),
            Value::bool(true)
        );
        assert_eq!(
            collections_contains(&[Value::string("tombo"), Value::string("mb")])
                .expect("contains"),
            Value::bool(true)
        );
        let mut map = IndexMap::new();
        map.insert(MapKey::from("k"), Value::nil());
        assert_eq!(
            collections_contains(&[Value::map(map), Value::list(vec![])]).expect("contains"),
            Value::bool(false)
        );
    }

    #[test]
    fn keys_and_values_keep_insertion_order() {
        let mut map = IndexMap::new();
        map.insert(MapKey::from("b"), Value::number(1.0));
        map.insert(MapKey::from("a"), Value::number(2.0));
        let map = Value::map(map);
        assert_eq!(
            collections_keys(&[map.clone()]).expect("keys"),
            Value::list(vec![Value::string("b"), Value::string("a")])
        );
        assert_eq!(
            collections_values(&[map]).expect("values"),
            numbers(&[1.0, 2.0])
        );
    }

    #[test]
    fn type_and_str() {
        assert_eq!(
            convert_type(&[Value::number(1.0)]).expect("type"),
            Value::string("Number")
        );
        assert_eq!(
            convert_str(&[numbers(&[1.0, 2.5])]).expect("str"),
            Value::string("[1, 2.5]")
        );
    }
}
