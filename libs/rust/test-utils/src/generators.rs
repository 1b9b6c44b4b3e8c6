//! Shared proptest generators.
//!
//! Strategies for the shapes services use for envelopes, identifiers and
//! record fields.

use proptest::prelude::*;

/// Identifier key spellings seen in the wild, in the verifier's default priority order.
pub const IDENTIFIER_KEY_VARIANTS: &[&str] = &["ID", "Id", "id", "_id", "_Id"];

/// One identifier key spelling.
pub fn identifier_key_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(IDENTIFIER_KEY_VARIANTS).prop_map(ToString::to_string)
}

/// Non-empty identifier values: object ids, UUID-like strings, or numbers.
pub fn identifier_value_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        "[0-9a-f]{24}".prop_map(serde_json::Value::from),
        "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}".prop_map(serde_json::Value::from),
        (1u64..1_000_000).prop_map(serde_json::Value::from),
    ]
}

/// Any capitalisation of `word`.
pub fn case_variant_strategy(word: &'static str) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<bool>(), word.len()).prop_map(move |upper| {
        word.chars()
            .zip(upper)
            .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
            .collect()
    })
}

/// Any capitalisation of the `data` wrapper key.
pub fn wrapper_key_strategy() -> impl Strategy<Value = String> {
    case_variant_strategy("data")
}

/// `camelCase` field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    "[a-z]{2,8}([A-Z][a-z]{1,6}){0,2}"
}

/// Six-field cron expressions.
pub fn cron_expression_strategy() -> impl Strategy<Value = String> {
    (0u8..60, prop_oneof![Just(5u8), Just(15), Just(30)])
        .prop_map(|(second, every)| format!("{second} */{every} * * * *"))
}

/// Scalar JSON values a record field might hold.
pub fn scalar_value_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i32>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 _*/.-]{0,24}".prop_map(serde_json::Value::from),
    ]
}

/// HTTP statuses a CRUD endpoint may answer with.
pub fn status_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![
        Just(200u16),
        Just(201),
        Just(204),
        Just(400),
        Just(404),
        Just(409),
        Just(500),
        Just(503),
    ]
}
