use docpack::bson::{Bson, BsonDecoder, BsonEncoder, Document};
use docpack::numeric::{Decimal128, NumericError};
use proptest::prelude::*;

fn text(input: &str) -> String {
    Decimal128::parse(input).unwrap().to_string()
}

#[test]
fn canonical_strings() {
    for (input, expected) in [
        ("0", "0"),
        ("-0", "-0"),
        ("1.0", "1.0"),
        ("1", "1"),
        ("-1", "-1"),
        ("0.1", "0.1"),
        ("12345.6789", "12345.6789"),
        ("1E+2", "1E+2"),
        ("100", "100"),
        ("1.5E-10", "1.5E-10"),
        ("9.999999999999999999999999999999999E+6144", "9.999999999999999999999999999999999E+6144"),
        ("-Infinity", "-Infinity"),
        ("NaN", "NaN"),
    ] {
        assert_eq!(text(input), expected, "{input}");
    }
}

#[test]
fn exponent_limits() {
    assert!(matches!(Decimal128::parse("1E+6145"), Err(NumericError::Overflow(_))));
    assert!(matches!(Decimal128::parse("1E-6177"), Err(NumericError::Overflow(_))));
    // zeros clamp
    assert_eq!(text("0E+6200"), "0E+6111");
    // trailing zeros of the coefficient absorb an underflowing exponent
    assert_eq!(text("1000E-6178"), "1.0E-6175");
}

#[test]
fn inexact_inputs_fail() {
    assert!(matches!(
        Decimal128::parse("1.2345678901234567890123456789012345"),
        Err(NumericError::Overflow(_))
    ));
    assert!(matches!(
        Decimal128::parse("1.2.3"),
        Err(NumericError::InvalidDecimal(_))
    ));
}

#[test]
fn wire_bytes_are_little_endian() {
    let one = Decimal128::parse("1").unwrap();
    let mut d = Document::new();
    d.insert("d", one);
    let bytes = BsonEncoder::new().encode(&d).unwrap();
    assert_eq!(bytes[4], 0x13);
    assert_eq!(&bytes[7..23], &one.bytes());
    assert_eq!(bytes[7], 1);
    assert_eq!(&bytes[21..23], &[0x40, 0x30]);
    let back = BsonDecoder::new().decode(&bytes).unwrap();
    assert_eq!(back.get("d"), Some(&Bson::Decimal128(one)));
}

proptest! {
    #[test]
    fn integers_print_as_themselves(v in any::<i64>()) {
        prop_assert_eq!(text(&v.to_string()), v.to_string());
    }

    #[test]
    fn printed_text_reparses_to_same_bits(
        coefficient in 0u64..=u64::MAX,
        exponent in -6100i32..6100,
        negative in any::<bool>(),
    ) {
        let input = format!("{}{}E{}", if negative { "-" } else { "" }, coefficient, exponent);
        let first = Decimal128::parse(&input).unwrap();
        let second = Decimal128::parse(&first.to_string()).unwrap();
        prop_assert_eq!(first.bytes(), second.bytes());
    }
}
