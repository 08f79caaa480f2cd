use docpack::bson::{
    calculate_object_size, Binary, BinarySubtype, Bson, BsonDecoder, BsonEncoder, BsonError,
    DateTime, DbRef, DecoderOptions, Document, EncoderOptions, JavaScriptCodeWithScope, ObjectId,
    Regex, SharedDocument, Timestamp, UndefinedEncoding,
};
use docpack::numeric::Decimal128;
use proptest::prelude::*;

fn doc<const N: usize>(fields: [(&str, Bson); N]) -> Document {
    fields.into_iter().collect()
}

fn round_trip(d: &Document) -> Document {
    let bytes = BsonEncoder::new().encode(d).unwrap();
    BsonDecoder::new().decode(&bytes).unwrap()
}

#[test]
fn small_document_wire_bytes() {
    let d = doc([
        ("a", Bson::Int32(1)),
        ("b", Bson::from("x")),
        ("c", Bson::Array(vec![1.into(), 2.into(), 3.into()])),
    ]);
    let bytes = BsonEncoder::new().encode(&d).unwrap();
    let expected: Vec<u8> = [
        &[50, 0, 0, 0][..],
        &[0x10, b'a', 0, 1, 0, 0, 0],
        &[0x02, b'b', 0, 2, 0, 0, 0, b'x', 0],
        &[0x04, b'c', 0, 26, 0, 0, 0],
        &[0x10, b'0', 0, 1, 0, 0, 0],
        &[0x10, b'1', 0, 2, 0, 0, 0],
        &[0x10, b'2', 0, 3, 0, 0, 0],
        &[0, 0],
    ]
    .concat();
    assert_eq!(bytes, expected);
    assert_eq!(BsonDecoder::new().decode(&bytes).unwrap(), d);
}

#[test]
fn every_element_type_round_trips() {
    let oid = ObjectId::parse_str("5f1d7f3e9d1c2b3a4f5e6d7c").unwrap();
    let d = doc([
        ("double", Bson::Double(-2.5)),
        ("string", Bson::from("héllo")),
        ("doc", Bson::Document(doc([("x", Bson::Null)]))),
        ("array", Bson::Array(vec![Bson::Boolean(true), Bson::from("s")])),
        ("bin", Bson::Binary(Binary::new(BinarySubtype::Generic, vec![0, 1, 2]))),
        ("legacy", Bson::Binary(Binary::new(BinarySubtype::BinaryOld, vec![9, 9]))),
        ("user", Bson::Binary(Binary::new(BinarySubtype::UserDefined(0x80), vec![7]))),
        ("undef", Bson::Undefined),
        ("oid", Bson::ObjectId(oid)),
        ("bool", Bson::Boolean(false)),
        ("date", Bson::DateTime(DateTime::from_millis(-1))),
        ("null", Bson::Null),
        ("re", Bson::RegularExpression(Regex::new("^a.*", "mi").unwrap())),
        ("code", Bson::JavaScriptCode("return 1".into())),
        ("sym", Bson::Symbol("sym".into())),
        (
            "cws",
            Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope {
                code: "x + 1".into(),
                scope: doc([("x", Bson::Int32(1))]),
            }),
        ),
        ("int", Bson::Int32(i32::MIN)),
        ("ts", Bson::Timestamp(Timestamp { time: 7, increment: 9 })),
        ("long", Bson::Int64(i64::MAX)),
        ("dec", Bson::Decimal128(Decimal128::parse("12.340").unwrap())),
        ("min", Bson::MinKey),
        ("max", Bson::MaxKey),
        ("ref", Bson::DbRef(DbRef::new("users", oid))),
    ]);
    assert_eq!(round_trip(&d), d);
}

#[test]
fn timestamp_is_increment_first() {
    let d = doc([("t", Bson::Timestamp(Timestamp { time: 1, increment: 2 }))]);
    let bytes = BsonEncoder::new().encode(&d).unwrap();
    assert_eq!(&bytes[7..15], &[2, 0, 0, 0, 1, 0, 0, 0]);
}

#[test]
fn lone_continuation_byte_fails() {
    // {"s": "\x80"}
    let bytes = [14, 0, 0, 0, 0x02, b's', 0, 2, 0, 0, 0, 0x80, 0, 0];
    assert!(matches!(
        BsonDecoder::new().decode(&bytes),
        Err(BsonError::InvalidUtf8 { .. })
    ));
}

#[test]
fn truncated_and_oversized_buffers() {
    let bytes = BsonEncoder::new()
        .encode(&doc([("a", Bson::Int32(1))]))
        .unwrap();
    let decoder = BsonDecoder::new();
    assert!(decoder.decode(&bytes[..bytes.len() - 1]).is_err());
    let mut longer = bytes.clone();
    longer.push(0);
    assert!(matches!(
        decoder.decode(&longer),
        Err(BsonError::MalformedLength { .. })
    ));
    assert!(matches!(
        decoder.decode(&[1, 2]),
        Err(BsonError::MalformedLength { declared: -1, .. })
    ));
}

#[test]
fn self_containing_document_is_cyclic() {
    let node = SharedDocument::new(Document::new());
    node.write().insert("self", node.clone());
    let root = doc([("root", Bson::Shared(node.clone()))]);
    let err = BsonEncoder::new().encode(&root).unwrap_err();
    assert!(matches!(err, BsonError::CyclicStructure { ref path } if path == "root.self"));

    // The same node twice, side by side, is not a cycle.
    let leaf = SharedDocument::new(doc([("v", Bson::Int32(1))]));
    let twice = doc([
        ("a", Bson::Shared(leaf.clone())),
        ("b", Bson::Shared(leaf)),
    ]);
    let back = round_trip(&twice);
    assert_eq!(back.get_document("a"), back.get_document("b"));
    node.write().remove("self");
}

#[test]
fn key_checks() {
    let mut strict = BsonEncoder::with_options(EncoderOptions {
        check_keys: true,
        ..EncoderOptions::default()
    });
    assert!(matches!(
        strict.encode(&doc([("$set", Bson::Int32(1))])),
        Err(BsonError::InvalidKey { .. })
    ));
    assert!(matches!(
        strict.encode(&doc([("a.b", Bson::Int32(1))])),
        Err(BsonError::InvalidKey { .. })
    ));
    assert!(strict
        .encode(&doc([("r", Bson::DbRef(DbRef::new("c", 1)))]))
        .is_ok());
    let listed = doc([(
        "list",
        Bson::Array(vec![Bson::Document(doc([("$bad", Bson::Int32(1))]))]),
    )]);
    assert!(matches!(
        strict.encode(&listed),
        Err(BsonError::InvalidKey { ref key, .. }) if key == "list.0.$bad"
    ));
    let deeper = doc([(
        "list",
        Bson::Array(vec![Bson::Array(vec![Bson::Document(doc([("a.b", Bson::Null)]))])]),
    )]);
    assert!(matches!(
        strict.encode(&deeper),
        Err(BsonError::InvalidKey { ref key, .. }) if key == "list.0.0.a.b"
    ));
    assert!(BsonEncoder::new().encode(&listed).is_ok());
    assert!(matches!(
        BsonEncoder::new().encode(&doc([("a\0b", Bson::Null)])),
        Err(BsonError::InvalidKey { .. })
    ));
}

#[test]
fn undefined_policies() {
    let d = doc([("u", Bson::Undefined), ("n", Bson::Int32(1))]);
    for (policy, expected) in [
        (UndefinedEncoding::Tagged, Some(Bson::Undefined)),
        (UndefinedEncoding::Null, Some(Bson::Null)),
        (UndefinedEncoding::Skip, None),
    ] {
        let options = EncoderOptions {
            undefined: policy,
            ..EncoderOptions::default()
        };
        let bytes = BsonEncoder::with_options(options.clone()).encode(&d).unwrap();
        assert_eq!(calculate_object_size(&d, &options).unwrap(), bytes.len());
        let back = BsonDecoder::new().decode(&bytes).unwrap();
        assert_eq!(back.get("u").cloned(), expected, "{policy:?}");
    }
}

#[test]
fn skipped_undefined_array_slots_become_null() {
    let d = doc([(
        "a",
        Bson::Array(vec![Bson::Int32(1), Bson::Undefined, Bson::Int32(3)]),
    )]);
    let options = EncoderOptions {
        undefined: UndefinedEncoding::Skip,
        ..EncoderOptions::default()
    };
    let bytes = BsonEncoder::with_options(options.clone()).encode(&d).unwrap();
    // element keys of the embedded array, in order
    let keys: Vec<u8> = [12usize, 19, 22].iter().map(|&at| bytes[at]).collect();
    assert_eq!(keys, b"012");
    let back = BsonDecoder::new().decode(&bytes).unwrap();
    assert_eq!(
        back.get_array("a"),
        Some(&vec![Bson::Int32(1), Bson::Null, Bson::Int32(3)])
    );
    assert_eq!(calculate_object_size(&d, &options).unwrap(), bytes.len());
}

#[test]
fn foreign_regex_flags_survive_a_round_trip() {
    // {"r": /a/gi} as written by another driver
    let bytes = [13, 0, 0, 0, 0x0b, b'r', 0, b'a', 0, b'g', b'i', 0, 0];
    let decoded = BsonDecoder::new().decode(&bytes).unwrap();
    assert_eq!(BsonEncoder::new().encode(&decoded).unwrap(), bytes);
    assert!(Regex::new("a", "gi").is_err());
}

#[test]
fn functions_need_opt_in() {
    let d = doc([("f", Bson::Function("function () {}".into()))]);
    assert!(matches!(
        BsonEncoder::new().encode(&d),
        Err(BsonError::UnsupportedValueType { .. })
    ));
    let mut encoder = BsonEncoder::with_options(EncoderOptions {
        serialize_functions: true,
        ..EncoderOptions::default()
    });
    let back = BsonDecoder::new().decode(&encoder.encode(&d).unwrap()).unwrap();
    assert_eq!(back.get("f"), Some(&Bson::JavaScriptCode("function () {}".into())));
}

#[test]
fn sequences_and_trailing_bytes() {
    let mut encoder = BsonEncoder::new();
    let mut data = encoder.encode(&doc([("a", Bson::Int32(1))])).unwrap();
    let second = encoder.encode(&doc([("b", Bson::Int32(2))])).unwrap();
    data.extend_from_slice(&second);
    let (docs, next) = BsonDecoder::new().decode_sequence(&data, 2).unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(next, data.len());
    assert_eq!(docs[1].get_i32("b"), Some(2));

    let lenient = BsonDecoder::with_options(DecoderOptions {
        allow_trailing_bytes: true,
        ..DecoderOptions::default()
    });
    assert_eq!(lenient.decode(&data).unwrap().get_i32("a"), Some(1));
}

fn leaf() -> impl Strategy<Value = Bson> {
    prop_oneof![
        any::<i32>().prop_map(Bson::Int32),
        any::<i64>().prop_map(Bson::Int64),
        (-1e12f64..1e12).prop_map(Bson::Double),
        any::<bool>().prop_map(Bson::Boolean),
        "[ -~é中]{0,12}".prop_map(Bson::String),
        Just(Bson::Null),
        any::<i64>().prop_map(|ms| Bson::DateTime(DateTime::from_millis(ms))),
        proptest::collection::vec(any::<u8>(), 0..16)
            .prop_map(|bytes| Bson::Binary(Binary::new(BinarySubtype::Generic, bytes))),
    ]
}

fn value() -> impl Strategy<Value = Bson> {
    leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Bson::Array),
            proptest::collection::vec(("[a-z]{1,6}", inner), 0..6)
                .prop_map(|pairs| Bson::Document(pairs.into_iter().collect())),
        ]
    })
}

fn document() -> impl Strategy<Value = Document> {
    proptest::collection::vec(("[a-z_]{1,8}", value()), 0..8)
        .prop_map(|pairs| pairs.into_iter().collect())
}

proptest! {
    #[test]
    fn decode_inverts_encode(d in document()) {
        let bytes = BsonEncoder::new().encode(&d).unwrap();
        prop_assert_eq!(BsonDecoder::new().decode(&bytes).unwrap(), d);
    }

    #[test]
    fn size_prefix_matches_buffer(d in document()) {
        let bytes = BsonEncoder::new().encode(&d).unwrap();
        let declared = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        prop_assert_eq!(declared as usize, bytes.len());
        prop_assert_eq!(
            calculate_object_size(&d, &EncoderOptions::default()).unwrap(),
            bytes.len()
        );
    }

    #[test]
    fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = BsonDecoder::new().decode(&bytes);
    }
}
