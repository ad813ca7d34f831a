// tests/decode_literals.rs

use proptest::prelude::*;
use t32ctl::cli::parse_constant;
use t32ctl::decode::{ResultType, Value, decode_as, encode};

fn integer_kind() -> impl Strategy<Value = ResultType> {
    prop_oneof![
        Just(ResultType::Hexadecimal),
        Just(ResultType::Binary),
        Just(ResultType::Decimal),
    ]
}

proptest! {
    #[test]
    fn engine_integer_literals_decode_to_their_value(
        n in any::<i64>(),
        kind in integer_kind(),
    ) {
        let value = Value::Int(i128::from(n));
        let text = encode(&value, kind);
        prop_assert_eq!(decode_as(&text, kind).unwrap(), value);
    }

    #[test]
    fn engine_float_literals_decode_to_their_value(
        x in prop::num::f64::POSITIVE
            | prop::num::f64::NEGATIVE
            | prop::num::f64::NORMAL
            | prop::num::f64::SUBNORMAL
            | prop::num::f64::ZERO,
    ) {
        let value = Value::Float(x);
        let text = encode(&value, ResultType::Float);
        prop_assert_eq!(decode_as(&text, ResultType::Float).unwrap(), value);
    }

    #[test]
    fn exponent_float_literals_decode_to_their_value(
        x in prop::num::f64::POSITIVE
            | prop::num::f64::NEGATIVE
            | prop::num::f64::NORMAL
            | prop::num::f64::SUBNORMAL,
    ) {
        prop_assert_eq!(
            decode_as(&format!("{x:e}"), ResultType::Float).unwrap(),
            Value::Float(x)
        );
        prop_assert_eq!(
            decode_as(&format!("{x:E}"), ResultType::Float).unwrap(),
            Value::Float(x)
        );
    }

    #[test]
    fn cli_hex_and_decimal_literals_agree(n in any::<u32>()) {
        let n = u64::from(n);
        prop_assert_eq!(parse_constant(&format!("0x{n:x}")), Ok(n));
        prop_assert_eq!(parse_constant(&format!("{n}.")), Ok(n));
        prop_assert_eq!(parse_constant(&format!("{n}")), Ok(n));
    }
}

#[test]
fn float_literals_with_signs_and_exponents() {
    for (text, expected) in [("-2.5", -2.5), ("1.5e3", 1500.0), ("-4E-2", -0.04), ("7.", 7.0)] {
        assert_eq!(
            decode_as(text, ResultType::Float).unwrap(),
            Value::Float(expected),
            "decoding {text}"
        );
    }
}

#[test]
fn booleans_use_function_syntax() {
    assert_eq!(encode(&Value::Bool(true), ResultType::Boolean), "TRUE()");
    assert_eq!(
        decode_as("FALSE()", ResultType::Boolean).unwrap(),
        Value::Bool(false)
    );
}
