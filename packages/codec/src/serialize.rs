//! Field values as XML attribute strings.

use std::io;

use olx_core::{format_date, json_to_value, value_to_json, FieldType, Value};
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

/// Decode an attribute string for a field of type `field_type`.
///
/// The string is first read as JSON. JSON `null` becomes `Null`. A decoded
/// value the field type can coerce is returned as decoded (not coerced).
/// Anything else, including text that is not JSON at all, comes back as the
/// original string. This never fails.
///
/// ```rust
/// use olx_codec::deserialize_field;
/// use olx_core::{FieldType, Value};
///
/// assert_eq!(deserialize_field(FieldType::Integer, "-2"), Value::from(-2i64));
/// assert_eq!(deserialize_field(FieldType::String, "false"), Value::from("false"));
/// assert_eq!(deserialize_field(FieldType::Integer, "null"), Value::Null);
/// ```
pub fn deserialize_field(field_type: FieldType, raw: &str) -> Value {
    let decoded = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Null) => return Value::Null,
        Ok(json) => json_to_value(json),
        Err(_) => return Value::String(raw.to_string()),
    };
    match field_type.coerce(&decoded) {
        Some(_) => decoded,
        None => Value::String(raw.to_string()),
    }
}

/// Encode a field value as an attribute string.
///
/// Strings are written unchanged and dates as ISO-8601. Everything else is
/// JSON in the legacy style, see [`to_legacy_json`].
pub fn serialize_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Date(date) => format_date(date),
        other => to_legacy_json(&value_to_json(other)),
    }
}

/// JSON with `", "` and `": "` separators and non-ASCII characters
/// written as `\uXXXX` escapes, matching existing course exports.
pub fn to_legacy_json(json: &serde_json::Value) -> String {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, LegacyFormatter);
    if json.serialize(&mut serializer).is_err() {
        // Writing into a Vec cannot fail.
        return json.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| json.to_string())
}

struct LegacyFormatter;

impl Formatter for LegacyFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collection_literals::btree;
    use olx_core::parse_date;

    #[test]
    fn deserialize_table() {
        use FieldType::*;

        let cases: Vec<(FieldType, &str, Value)> = vec![
            (Integer, "-2", Value::from(-2i64)),
            (Integer, "false", Value::from(false)),
            (Integer, "\"450\"", Value::from("450")),
            (Integer, "\"false\"", Value::from("\"false\"")),
            (Integer, "[3]", Value::from("[3]")),
            (Integer, "2.5", Value::from(2.5)),
            (Float, "\"2.5\"", Value::from("2.5")),
            (Float, "{}", Value::from("{}")),
            (String, "false", Value::from("false")),
            (String, "[1]", Value::from("[1]")),
            (String, "\"quoted\"", Value::from("quoted")),
            (String, "plain text", Value::from("plain text")),
            (Boolean, "\"fAlse\"", Value::from("fAlse")),
            (Boolean, "true", Value::from(true)),
            (Boolean, "maybe", Value::from("maybe")),
            (List, "[1, 2]", Value::from(vec![1i64, 2])),
            (List, "{\"a\": 1}", Value::from("{\"a\": 1}")),
            (Dict, "{\"a\": 1}", Value::Dict(btree! {"a".to_string() => Value::from(1i64)})),
            (Date, "\"2012-12-31T23:00:00Z\"", Value::from("2012-12-31T23:00:00Z")),
            (Date, "2012-12-31", Value::from("2012-12-31")),
            (Any, "null", Value::Null),
            (Integer, "", Value::from("")),
        ];

        for (field_type, raw, expected) in cases {
            assert_eq!(
                deserialize_field(field_type, raw),
                expected,
                "{} {:?}",
                field_type,
                raw
            );
        }
    }

    #[test]
    fn serialize_strings_unchanged() {
        assert_eq!(serialize_field(&Value::from("Week 1")), "Week 1");
        assert_eq!(serialize_field(&Value::from("{not json")), "{not json");
    }

    #[test]
    fn serialize_dates() {
        let utc = parse_date("2013-04-16T00:00:00Z").unwrap();
        assert_eq!(serialize_field(&Value::Date(utc)), "2013-04-16T00:00:00Z");
        let shifted = parse_date("2013-04-16T09:00:00+09:00").unwrap();
        assert_eq!(serialize_field(&Value::Date(shifted)), "2013-04-16T09:00:00+09:00");
    }

    #[test]
    fn serialize_json_with_legacy_separators() {
        assert_eq!(serialize_field(&Value::from(true)), "true");
        assert_eq!(serialize_field(&Value::from(3i64)), "3");
        assert_eq!(serialize_field(&Value::from(1.5)), "1.5");
        assert_eq!(serialize_field(&Value::Null), "null");
        assert_eq!(serialize_field(&Value::from(vec![1i64, 2, 3])), "[1, 2, 3]");
        let dict = Value::Dict(btree! {
            "0".to_string() => Value::from("alpha"),
            "1".to_string() => Value::from(vec!["a", "b"]),
        });
        assert_eq!(serialize_field(&dict), r#"{"0": "alpha", "1": ["a", "b"]}"#);
    }

    #[test]
    fn legacy_json_escapes_non_ascii() {
        let json = serde_json::json!(["café", "😀"]);
        assert_eq!(to_legacy_json(&json), r#"["caf\u00e9", "\ud83d\ude00"]"#);
    }

    #[test]
    fn serialized_values_deserialize_back() {
        let dict = Value::Dict(btree! {"x".to_string() => Value::from(1i64)});
        for (field_type, value) in [
            (FieldType::Integer, Value::from(7i64)),
            (FieldType::Boolean, Value::from(false)),
            (FieldType::List, Value::from(vec!["a"])),
            (FieldType::Dict, dict),
        ] {
            assert_eq!(deserialize_field(field_type, &serialize_field(&value)), value);
        }
    }
}
