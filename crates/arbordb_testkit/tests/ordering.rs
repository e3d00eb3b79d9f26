//! Ordering laws of the key encoder.

#![allow(unsafe_code)]

use arbordb_codec::{encode_compound, encode_key, CollatedKey, KeyBuilder, Value};
use arbordb_testkit::generators::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn encoded_order_is_value_order(a in value_strategy(3), b in value_strategy(3)) {
        let ka = encode_key(&a).unwrap();
        let kb = encode_key(&b).unwrap();
        prop_assert_eq!(ka.cmp(&kb), a.collate(&b));
    }

    #[test]
    fn compound_keys_order_element_wise(
        a in compound_key_strategy(),
        b in compound_key_strategy(),
    ) {
        let ka = encode_compound(&a).unwrap();
        let kb = encode_compound(&b).unwrap();
        let expected = Value::Array(a).collate(&Value::Array(b));
        prop_assert_eq!(ka.cmp(&kb), expected);
    }

    #[test]
    fn builder_matches_compound_encoding(parts in compound_key_strategy()) {
        let mut builder = KeyBuilder::new();
        builder.begin_array();
        for part in &parts {
            builder.add_value(part).unwrap();
        }
        builder.end_array().unwrap();
        prop_assert_eq!(builder.build().unwrap(), encode_compound(&parts).unwrap());
    }

    #[test]
    fn top_level_values_concatenate(parts in compound_key_strategy()) {
        let mut builder = KeyBuilder::new();
        let mut expected = Vec::new();
        for part in &parts {
            builder.add_value(part).unwrap();
            expected.extend_from_slice(encode_key(part).unwrap().as_bytes());
        }
        let built = builder.build().unwrap();
        prop_assert_eq!(built.as_bytes(), &expected[..]);
    }

    #[test]
    fn raw_wrap_is_bytewise_identical(v in value_strategy(3)) {
        let fresh = encode_key(&v).unwrap();
        let wrapped = CollatedKey::from_raw(fresh.to_bytes());
        prop_assert_eq!(wrapped.as_bytes(), fresh.as_bytes());

        let rebuilt = KeyBuilder::from_encoded(fresh.as_bytes()).build().unwrap();
        prop_assert_eq!(rebuilt, fresh);
    }

    #[test]
    fn raw_wrap_through_the_boundary_compares_equal(json in json_body_strategy()) {
        use arbordb_ffi::{arb_key_add_json, arb_key_compare, arb_key_free, arb_key_new, arb_key_with_bytes};

        let fresh = encode_key(&Value::from_json(&json).unwrap()).unwrap();
        let text = std::ffi::CString::new(json.to_string()).unwrap();
        unsafe {
            let wrapped = arb_key_with_bytes(fresh.as_bytes().as_ptr(), fresh.len(), std::ptr::null_mut());
            let parsed = arb_key_new();
            let ok = arb_key_add_json(parsed, text.as_ptr(), std::ptr::null_mut());
            let order = arb_key_compare(wrapped, parsed);
            arb_key_free(wrapped);
            arb_key_free(parsed);
            prop_assert!(ok);
            prop_assert_eq!(order, 0);
        }
    }
}

#[test]
fn type_order_across_kinds() {
    let ordered = [
        Value::Null,
        Value::Bool(false),
        Value::Bool(true),
        Value::Number(f64::NEG_INFINITY),
        Value::Number(-1.5),
        Value::Number(0.0),
        Value::Number(2.0),
        Value::Number(f64::INFINITY),
        Value::Text(String::new()),
        Value::Text("a".into()),
        Value::Text("a\0".into()),
        Value::Text("b".into()),
        Value::Array(vec![]),
        Value::Array(vec![Value::Null]),
        Value::Array(vec![Value::Null, Value::Null]),
        Value::Array(vec![Value::Bool(false)]),
        unique_map(vec![]),
        unique_map(vec![(Value::Text("a".into()), Value::Null)]),
        unique_map(vec![(Value::Text("b".into()), Value::Null)]),
    ];
    let keys: Vec<_> = ordered.iter().map(|v| encode_key(v).unwrap()).collect();
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1], "{:?} should sort before {:?}", pair[0], pair[1]);
    }
}

#[test]
fn malformed_input_is_rejected() {
    assert!(encode_key(&Value::Number(f64::NAN)).is_err());
    let duplicate = Value::Map(vec![
        (Value::Text("k".into()), Value::Null),
        (Value::Text("k".into()), Value::Bool(true)),
    ]);
    assert!(encode_key(&duplicate).is_err());

    let mut open = KeyBuilder::new();
    open.begin_array();
    assert!(open.build().is_err());

    assert!(CollatedKey::from_raw(vec![0x05u8, b'a']).to_value().is_err());
}
