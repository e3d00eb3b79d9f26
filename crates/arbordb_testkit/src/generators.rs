//! Property-based test generators using proptest.
//!
//! Provides strategies for generating keys, document IDs and operation
//! sequences that respect the invariants of the encoder and the handle.

use arbordb_codec::Value;
use proptest::prelude::*;
use std::cmp::Ordering;

/// Strategy for numbers, including the extremes of the range.
///
/// Never produces NaN, which is not encodable.
pub fn number_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => -1e9f64..1e9,
        2 => any::<i32>().prop_map(f64::from),
        1 => prop::sample::select(vec![
            0.0,
            -0.0,
            f64::MIN_POSITIVE,
            -f64::MIN_POSITIVE,
            f64::MAX,
            f64::MIN,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ]),
    ]
}

/// Strategy for strings, including embedded NULs and non-ASCII codepoints.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[a-d]{0,5}",
        1 => "[a\\x00\\x01é\u{10348}]{0,4}",
    ]
}

/// Strategy for scalar values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        number_strategy().prop_map(Value::Number),
        text_strategy().prop_map(Value::Text),
    ]
}

/// Strategy for arbitrary encodable values, nested up to `depth` levels.
///
/// Map keys may be of any scalar type; duplicates are removed so the value
/// stays encodable.
pub fn value_strategy(depth: u32) -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(depth, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec((scalar_strategy(), inner), 0..4).prop_map(unique_map),
        ]
    })
}

/// Strategy for compound keys: a short list of mixed-type values.
pub fn compound_key_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(value_strategy(2), 1..4)
}

/// Builds a map value, keeping the first entry for each key.
pub fn unique_map(pairs: Vec<(Value, Value)>) -> Value {
    let mut unique: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        if !unique.iter().any(|(k, _)| k.collate(&key) == Ordering::Equal) {
            unique.push((key, value));
        }
    }
    Value::map(unique)
}

/// Strategy for JSON documents, as stored in document bodies.
pub fn json_body_strategy() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i32>().prop_map(serde_json::Value::from),
        "[a-z ]{0,12}".prop_map(serde_json::Value::String),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
            .prop_map(|map| serde_json::Value::Object(map.into_iter().collect()))
    })
}

/// Strategy for valid document IDs.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,11}"
}

/// A single write against a handle.
#[derive(Debug, Clone)]
pub enum DocOperation {
    /// Write a document.
    Put {
        /// The document ID.
        doc_id: String,
        /// The JSON body.
        body: Vec<u8>,
    },
    /// Purge a document.
    Purge {
        /// The document ID.
        doc_id: String,
    },
}

impl DocOperation {
    /// The document this operation touches.
    pub fn doc_id(&self) -> &str {
        match self {
            DocOperation::Put { doc_id, .. } | DocOperation::Purge { doc_id } => doc_id,
        }
    }
}

/// Strategy for generating document operations over a small ID space, so
/// operations collide.
pub fn doc_operation_strategy() -> impl Strategy<Value = DocOperation> {
    let doc_id = "doc[0-7]";
    prop_oneof![
        3 => (doc_id, json_body_strategy()).prop_map(|(doc_id, body)| DocOperation::Put {
            doc_id,
            body: body.to_string().into_bytes(),
        }),
        1 => doc_id.prop_map(|doc_id| DocOperation::Purge { doc_id }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<DocOperation>> {
    prop::collection::vec(doc_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbordb_codec::encode_key;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_values_encode(value in value_strategy(3)) {
            prop_assert!(encode_key(&value).is_ok());
        }

        #[test]
        fn numbers_are_never_nan(n in number_strategy()) {
            prop_assert!(!n.is_nan());
        }

        #[test]
        fn doc_ids_are_not_empty(id in doc_id_strategy()) {
            prop_assert!(!id.is_empty());
        }
    }

    #[test]
    fn unique_map_drops_duplicate_keys() {
        let map = unique_map(vec![
            (Value::Number(0.0), Value::Bool(true)),
            (Value::Number(-0.0), Value::Bool(false)),
            (Value::Text("a".into()), Value::Null),
        ]);
        match map {
            Value::Map(pairs) => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs[0].1, Value::Bool(true));
            }
            other => panic!("expected a map, got {other:?}"),
        }
    }
}
