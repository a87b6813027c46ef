/*!
 * Serde helpers for loosely-typed step parameters.
 *
 * Pipeline definitions are JSON documents that are frequently written by hand,
 * so numeric parameters may arrive quoted and state lists may arrive as a
 * single string. These helpers accept both spellings.
 */

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize an optional non-negative integer given as a number or a string.
///
/// ```json
/// { "interval_seconds": 30 }
/// { "interval_seconds": "30" }
/// { "interval_seconds": null }
/// ```
pub fn deserialize_optional_u64<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| {
                D::Error::custom(format!("Expected a non-negative integer, found: {n}"))
            }),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("Cannot parse '{s}' as a non-negative integer"))),
        Some(other) => Err(D::Error::custom(format!(
            "Expected numeric value, found: {other}"
        ))),
    }
}

/// Deserialize an optional list of strings, accepting a bare string as a one-element list.
pub fn deserialize_optional_string_list<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(vec![s])),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(D::Error::custom(format!(
                    "Expected string list entry, found: {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(D::Error::custom(format!(
            "Expected string or list of strings, found: {other}"
        ))),
    }
}
