//! The pipe-filter standard library (spec §4.4 "pipe filters"). Grounded on
//! the teacher's `expression::extensions` (same `(base, args) -> Value`
//! dispatch shape), but replacing its huge JS-method catalog with the
//! spec's nine named filters — nothing else is callable through `|`.

use prana_workflow::Value;

use super::ExpressionError;

const NAMES: &[&str] = &[
    "default",
    "upper_case",
    "lower_case",
    "capitalize",
    "truncate",
    "length",
    "first",
    "round",
    "format_currency",
];

pub fn is_known(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Apply filter `name` to `base` with the given already-evaluated `args`
/// (spec §4.4's filter stdlib; also reused for bare `ident(args)` calls,
/// where `args[0]` plays the role of the piped-in base value).
pub fn apply(name: &str, base: Value, args: &[Value]) -> Result<Value, ExpressionError> {
    match name {
        "default" => {
            let fallback = args.first().cloned().unwrap_or(Value::Null);
            Ok(if base.is_null() { fallback } else { base })
        }
        "upper_case" => Ok(Value::String(base.render().to_uppercase())),
        "lower_case" => Ok(Value::String(base.render().to_lowercase())),
        "capitalize" => Ok(Value::String(capitalize(&base.render()))),
        "truncate" => truncate(&base, args),
        "length" => Ok(Value::Integer(length(&base) as i64)),
        "first" => Ok(first(&base)),
        "round" => round(&base, args),
        "format_currency" => format_currency(&base, args),
        other => Err(ExpressionError::UnknownFilter(other.to_string())),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn truncate(base: &Value, args: &[Value]) -> Result<Value, ExpressionError> {
    let n = args
        .first()
        .and_then(Value::as_f64)
        .ok_or_else(|| ExpressionError::InvalidArgument("truncate(n, suffix?) requires a numeric n".to_string()))?
        as usize;
    let suffix = args.get(1).and_then(Value::as_str).unwrap_or("...");
    let s = base.render();
    let char_count = s.chars().count();
    if char_count <= n {
        return Ok(Value::String(s));
    }
    let truncated: String = s.chars().take(n).collect();
    Ok(Value::String(format!("{truncated}{suffix}")))
}

fn length(base: &Value) -> usize {
    match base {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        _ => base.render().chars().count(),
    }
}

fn first(base: &Value) -> Value {
    match base {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        Value::String(s) => s.chars().next().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn round(base: &Value, args: &[Value]) -> Result<Value, ExpressionError> {
    let n = base
        .as_f64()
        .ok_or_else(|| ExpressionError::TypeError("round() requires a numeric value".to_string()))?;
    let precision = args.first().and_then(Value::as_f64).unwrap_or(0.0) as i32;
    let factor = 10f64.powi(precision);
    let rounded = (n * factor).round() / factor;
    if precision <= 0 {
        Ok(Value::Integer(rounded as i64))
    } else {
        Ok(Value::Float(rounded))
    }
}

fn format_currency(base: &Value, args: &[Value]) -> Result<Value, ExpressionError> {
    let n = base
        .as_f64()
        .ok_or_else(|| ExpressionError::TypeError("format_currency() requires a numeric value".to_string()))?;
    let code = args.first().and_then(Value::as_str).unwrap_or("USD");
    let symbol = currency_symbol(code);
    Ok(Value::String(format!("{symbol}{n:.2}")))
}

fn currency_symbol(code: &str) -> &'static str {
    match code.to_ascii_uppercase().as_str() {
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        _ => "",
    }
}
