// src/decode.rs

//! Decoding of typed evaluation results.
//!
//! The evaluate primitive returns the result as text plus a type tag. The
//! numeric tags use the engine's own literal conventions (`0x1F`, `0y101`,
//! `10.`), which [`decode`] turns into native values and [`encode`] writes
//! back out.

use std::fmt;

use crate::errors::{Result, T32Error};

/// Type tag attached to an evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultType {
    Boolean,
    Binary,
    Hexadecimal,
    Decimal,
    Float,
    Ascii,
    String,
    NumRange,
    Address,
    AddrRange,
    Time,
    TimeRange,
    BitMask,
    Empty,
}

impl ResultType {
    pub fn tag(self) -> u32 {
        match self {
            ResultType::Boolean => 0x0001,
            ResultType::Binary => 0x0002,
            ResultType::Hexadecimal => 0x0004,
            ResultType::Decimal => 0x0008,
            ResultType::Float => 0x0010,
            ResultType::Ascii => 0x0020,
            ResultType::String => 0x0040,
            ResultType::NumRange => 0x0080,
            ResultType::Address => 0x0100,
            ResultType::AddrRange => 0x0200,
            ResultType::Time => 0x0400,
            ResultType::TimeRange => 0x0800,
            ResultType::BitMask => 0x4000,
            ResultType::Empty => 0x8000,
        }
    }
}

impl TryFrom<u32> for ResultType {
    type Error = T32Error;

    fn try_from(tag: u32) -> Result<Self> {
        let kind = match tag {
            0x0001 => ResultType::Boolean,
            0x0002 => ResultType::Binary,
            0x0004 => ResultType::Hexadecimal,
            0x0008 => ResultType::Decimal,
            0x0010 => ResultType::Float,
            0x0020 => ResultType::Ascii,
            0x0040 => ResultType::String,
            0x0080 => ResultType::NumRange,
            0x0100 => ResultType::Address,
            0x0200 => ResultType::AddrRange,
            0x0400 => ResultType::Time,
            0x0800 => ResultType::TimeRange,
            0x4000 => ResultType::BitMask,
            0x8000 => ResultType::Empty,
            other => {
                return Err(T32Error::Decode(format!(
                    "unknown evaluation type tag {other:#x}"
                )));
            }
        };
        Ok(kind)
    }
}

/// Undecoded result of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalResult {
    pub text: String,
    pub tag: u32,
}

/// A decoded evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i128),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

pub fn decode(result: &EvalResult) -> Result<Value> {
    let kind = ResultType::try_from(result.tag)?;
    decode_as(&result.text, kind)
}

pub fn decode_as(text: &str, kind: ResultType) -> Result<Value> {
    let trimmed = text.trim();
    match kind {
        ResultType::Boolean => decode_bool(trimmed),
        ResultType::Hexadecimal => {
            let (negative, digits) = split_sign(trimmed);
            let digits = digits
                .strip_prefix("0x")
                .or_else(|| digits.strip_prefix("0X"))
                .unwrap_or(digits);
            parse_int(negative, digits, 16, text)
        }
        ResultType::Binary => {
            let digits = trimmed.strip_suffix('!').unwrap_or(trimmed);
            let (negative, digits) = split_sign(digits);
            let digits = digits
                .strip_prefix("0y")
                .or_else(|| digits.strip_prefix("0Y"))
                .unwrap_or(digits);
            parse_int(negative, digits, 2, text)
        }
        ResultType::Decimal => {
            let digits = trimmed.strip_suffix('.').unwrap_or(trimmed);
            let (negative, digits) = split_sign(digits);
            parse_int(negative, digits, 10, text)
        }
        ResultType::Float => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| T32Error::Decode(format!("invalid float '{text}': {e}"))),
        _ => Ok(Value::Text(text.to_string())),
    }
}

/// Render a value using the engine's literal convention for `kind`.
pub fn encode(value: &Value, kind: ResultType) -> String {
    match (value, kind) {
        (Value::Bool(true), _) => "TRUE()".to_string(),
        (Value::Bool(false), _) => "FALSE()".to_string(),
        (Value::Int(i), ResultType::Hexadecimal) => with_sign(*i, |v| format!("0x{v:X}")),
        (Value::Int(i), ResultType::Binary) => with_sign(*i, |v| format!("0y{v:b}")),
        (Value::Int(i), ResultType::Decimal) => format!("{i}."),
        (Value::Int(i), _) => i.to_string(),
        (Value::Float(x), _) => x.to_string(),
        (Value::Text(s), _) => s.clone(),
    }
}

fn decode_bool(text: &str) -> Result<Value> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "true()" | "1" => Ok(Value::Bool(true)),
        "false" | "false()" | "0" => Ok(Value::Bool(false)),
        _ => Err(T32Error::Decode(format!("invalid boolean '{text}'"))),
    }
}

fn split_sign(text: &str) -> (bool, &str) {
    match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    }
}

fn parse_int(negative: bool, digits: &str, radix: u32, original: &str) -> Result<Value> {
    let magnitude = i128::from_str_radix(digits, radix).map_err(|e| {
        T32Error::Decode(format!("invalid base-{radix} integer '{original}': {e}"))
    })?;
    Ok(Value::Int(if negative { -magnitude } else { magnitude }))
}

fn with_sign(value: i128, render: impl Fn(u128) -> String) -> String {
    if value < 0 {
        format!("-{}", render(value.unsigned_abs()))
    } else {
        render(value.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str, kind: ResultType) -> EvalResult {
        EvalResult {
            text: text.to_string(),
            tag: kind.tag(),
        }
    }

    #[test]
    fn booleans_accept_engine_spellings() {
        for text in ["TRUE()", "true", "1", " True() "] {
            assert_eq!(decode(&raw(text, ResultType::Boolean)).unwrap(), Value::Bool(true));
        }
        for text in ["FALSE()", "false", "0"] {
            assert_eq!(decode(&raw(text, ResultType::Boolean)).unwrap(), Value::Bool(false));
        }
        assert!(matches!(
            decode(&raw("maybe", ResultType::Boolean)),
            Err(T32Error::Decode(_))
        ));
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(decode(&raw("0x1F", ResultType::Hexadecimal)).unwrap(), Value::Int(31));
        assert_eq!(decode(&raw("ff", ResultType::Hexadecimal)).unwrap(), Value::Int(255));
        assert_eq!(decode(&raw("0y101", ResultType::Binary)).unwrap(), Value::Int(5));
        assert_eq!(decode(&raw("110!", ResultType::Binary)).unwrap(), Value::Int(6));
        assert_eq!(decode(&raw("42.", ResultType::Decimal)).unwrap(), Value::Int(42));
        assert_eq!(decode(&raw("-7", ResultType::Decimal)).unwrap(), Value::Int(-7));
        assert_eq!(decode(&raw("2.5", ResultType::Float)).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn other_tags_pass_text_through() {
        let value = decode(&raw("P:0x1000", ResultType::Address)).unwrap();
        assert_eq!(value, Value::Text("P:0x1000".to_string()));
    }

    #[test]
    fn unknown_tag_is_a_decode_error() {
        let result = EvalResult {
            text: "1".into(),
            tag: 0x1000,
        };
        assert!(matches!(decode(&result), Err(T32Error::Decode(_))));
    }

    #[test]
    fn encode_uses_engine_conventions() {
        assert_eq!(encode(&Value::Int(31), ResultType::Hexadecimal), "0x1F");
        assert_eq!(encode(&Value::Int(5), ResultType::Binary), "0y101");
        assert_eq!(encode(&Value::Int(10), ResultType::Decimal), "10.");
        assert_eq!(encode(&Value::Int(-3), ResultType::Hexadecimal), "-0x3");
        assert_eq!(decode(&raw("-0x3", ResultType::Hexadecimal)).unwrap(), Value::Int(-3));
        assert_eq!(encode(&Value::Bool(true), ResultType::Boolean), "TRUE()");
    }
}
