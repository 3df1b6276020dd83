//! Serde helpers for the persisted JSON formats.
//!
//! The committed-record log stores every integer as its decimal string so
//! values wider than a JavaScript-safe integer survive any reader. On the
//! way in both forms are accepted: older logs wrote plain numbers.

use serde::{de::Error, Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Str(String),
    Num(u64),
}

fn parse<E: Error>(raw: StringOrNumber) -> Result<u64, E> {
    match raw {
        StringOrNumber::Num(n) => Ok(n),
        StringOrNumber::Str(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| E::custom(format!("invalid decimal string {s:?}: {e}"))),
    }
}

/// `u64` as a decimal string.
pub mod decimal {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        parse(StringOrNumber::deserialize(deserializer)?)
    }
}

/// `Option<u64>` as a decimal string or `null`.
pub mod decimal_opt {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        Option::<StringOrNumber>::deserialize(deserializer)?
            .map(parse)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::decimal")]
        big: u64,
        #[serde(with = "super::decimal_opt", default)]
        maybe: Option<u64>,
    }

    #[test]
    fn writes_decimal_strings() {
        let json = serde_json::to_string(&Sample {
            big: u64::MAX,
            maybe: Some(7),
        })
        .unwrap();
        assert_eq!(json, r#"{"big":"18446744073709551615","maybe":"7"}"#);
    }

    #[test]
    fn reads_strings_and_numbers() {
        let a: Sample = serde_json::from_str(r#"{"big":"42","maybe":null}"#).unwrap();
        let b: Sample = serde_json::from_str(r#"{"big":42}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.maybe, None);
    }

    #[test]
    fn rejects_non_numeric_strings() {
        assert!(serde_json::from_str::<Sample>(r#"{"big":"forty-two"}"#).is_err());
    }
}
