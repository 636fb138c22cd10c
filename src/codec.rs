//! Codecs for JSON fields whose shape varies by value.
//!
//! Every type here decodes by looking at the next JSON token: a string, an
//! array, an object or a number each select one variant. A token that fits no
//! variant is a decode error, never a silent default.

use std::fmt;
use std::marker::PhantomData;

use itertools::Itertools;
use serde::de::{self, value, Deserializer, MapAccess, SeqAccess, Unexpected, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Integer stored in place of the literal `"auto"`.
pub const AUTO_SENTINEL: i64 = -1;

const AUTO: &str = "auto";

/// A single string or a list of strings, e.g. `stop` or an error `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringOrList {
    Single(String),
    List(Vec<String>),
}

impl StringOrList {
    /// One string for display; list elements are joined with newlines.
    ///
    /// # Example
    /// ```
    /// use aidispatch::codec::StringOrList;
    ///
    /// let list = StringOrList::List(vec!["a".to_string(), "b".to_string()]);
    /// assert_eq!(list.display_string(), "a\nb");
    /// ```
    pub fn display_string(&self) -> String {
        match self {
            Self::Single(text) => text.clone(),
            Self::List(items) => items.iter().join("\n"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Self::Single(text) => std::slice::from_ref(text),
            Self::List(items) => items,
        };
        items.iter().map(String::as_str)
    }
}

impl From<&str> for StringOrList {
    fn from(text: &str) -> Self {
        Self::Single(text.to_owned())
    }
}

impl From<String> for StringOrList {
    fn from(text: String) -> Self {
        Self::Single(text)
    }
}

impl From<Vec<String>> for StringOrList {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl Serialize for StringOrList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(text) => serializer.serialize_str(text),
            Self::List(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StringOrList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = StringOrList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or a list of strings")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(StringOrList::Single(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(StringOrList::Single(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
                Vec::deserialize(value::SeqAccessDeserializer::new(seq)).map(StringOrList::List)
            }
        }
        deserializer.deserialize_any(V)
    }
}

/// Plain text or a list of structured items, e.g. chat message content.
#[derive(Debug, Clone, PartialEq)]
pub enum TextOrList<T> {
    Text(String),
    List(Vec<T>),
}

impl<T: Serialize> Serialize for TextOrList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::List(items) => items.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for TextOrList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V<T>(PhantomData<T>);
        impl<'de, T: Deserialize<'de>> Visitor<'de> for V<T> {
            type Value = TextOrList<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or a list")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(TextOrList::Text(v.to_owned()))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
                Vec::deserialize(value::SeqAccessDeserializer::new(seq)).map(TextOrList::List)
            }
        }
        deserializer.deserialize_any(V(PhantomData))
    }
}

/// Plain text or a structured object, e.g. `tool_choice`.
#[derive(Debug, Clone, PartialEq)]
pub enum TextOrStructured<T> {
    Text(String),
    Structured(T),
}

impl<T: Serialize> Serialize for TextOrStructured<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Structured(inner) => inner.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for TextOrStructured<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V<T>(PhantomData<T>);
        impl<'de, T: Deserialize<'de>> Visitor<'de> for V<T> {
            type Value = TextOrStructured<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or an object")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(TextOrStructured::Text(v.to_owned()))
            }

            fn visit_map<M: MapAccess<'de>>(self, map: M) -> Result<Self::Value, M::Error> {
                T::deserialize(value::MapAccessDeserializer::new(map)).map(TextOrStructured::Structured)
            }
        }
        deserializer.deserialize_any(V(PhantomData))
    }
}

/// An integer, or the literal `"auto"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntOrAuto {
    Auto,
    Value(i64),
}

impl IntOrAuto {
    /// Sentinel form: [`AUTO_SENTINEL`] for `Auto`, the value otherwise.
    pub fn as_sentinel(self) -> i64 {
        match self {
            Self::Auto => AUTO_SENTINEL,
            Self::Value(v) => v,
        }
    }
}

impl From<i64> for IntOrAuto {
    fn from(v: i64) -> Self {
        if v == AUTO_SENTINEL {
            Self::Auto
        } else {
            Self::Value(v)
        }
    }
}

impl From<IntOrAuto> for i64 {
    fn from(v: IntOrAuto) -> Self {
        v.as_sentinel()
    }
}

impl Serialize for IntOrAuto {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str(AUTO),
            Self::Value(v) => serializer.serialize_i64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for IntOrAuto {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = IntOrAuto;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or \"auto\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v.eq_ignore_ascii_case(AUTO) {
                    Ok(IntOrAuto::Auto)
                } else {
                    Err(E::invalid_value(Unexpected::Str(v), &self))
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(IntOrAuto::from(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                i64::try_from(v)
                    .map(IntOrAuto::from)
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
            }
        }
        deserializer.deserialize_any(V)
    }
}

/// Serde adapter for `Option<i64>` fields that accept `"auto"`.
///
/// `"auto"` (any case) decodes to [`AUTO_SENTINEL`], which encodes back to
/// `"auto"`. `null` decodes to `None`.
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Params {
///     #[serde(default, with = "aidispatch::codec::int_or_auto")]
///     n_epochs: Option<i64>,
/// }
///
/// let params: Params = serde_json::from_str(r#"{"n_epochs": "AUTO"}"#).unwrap();
/// assert_eq!(params.n_epochs, Some(-1));
/// assert_eq!(serde_json::to_string(&params).unwrap(), r#"{"n_epochs":"auto"}"#);
/// ```
pub mod int_or_auto {
    use super::IntOrAuto;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => IntOrAuto::from(*v).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Option::<IntOrAuto>::deserialize(deserializer).map(|v| v.map(i64::from))
    }
}

/// Accepts `null`, a string or a number as an optional string.
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    struct V;
    impl<'de> Visitor<'de> for V {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("null, a string or a number")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_owned()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
    }
    deserializer.deserialize_any(V)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Part {
        kind: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Params {
        #[serde(default, with = "int_or_auto", skip_serializing_if = "Option::is_none")]
        batch_size: Option<i64>,
    }

    #[test]
    fn test_string_or_list() {
        let single: StringOrList = serde_json::from_value(json!("stop")).unwrap();
        assert_eq!(single, StringOrList::Single("stop".into()));

        let list: StringOrList = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(list.display_string(), "a\nb");
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(serde_json::to_value(&list).unwrap(), json!(["a", "b"]));

        assert!(serde_json::from_value::<StringOrList>(json!(42)).is_err());
        assert!(serde_json::from_value::<StringOrList>(json!({"a": 1})).is_err());
        assert!(serde_json::from_value::<StringOrList>(json!([1, 2])).is_err());
    }

    #[test]
    fn test_text_or_list() {
        let text: TextOrList<Part> = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(text, TextOrList::Text("hello".into()));

        let parts: TextOrList<Part> =
            serde_json::from_value(json!([{"kind": "text"}, {"kind": "image"}])).unwrap();
        match &parts {
            TextOrList::List(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            serde_json::to_value(&parts).unwrap(),
            json!([{"kind": "text"}, {"kind": "image"}])
        );

        assert!(serde_json::from_value::<TextOrList<Part>>(json!(true)).is_err());
    }

    #[test]
    fn test_text_or_structured() {
        let text: TextOrStructured<Part> = serde_json::from_value(json!("auto")).unwrap();
        assert_eq!(text, TextOrStructured::Text("auto".into()));

        let structured: TextOrStructured<Part> =
            serde_json::from_value(json!({"kind": "function"})).unwrap();
        assert_eq!(
            structured,
            TextOrStructured::Structured(Part { kind: "function".into() })
        );

        assert!(serde_json::from_value::<TextOrStructured<Part>>(json!([])).is_err());
    }

    #[test]
    fn test_int_or_auto_sentinel_round_trip() {
        assert_eq!(serde_json::to_value(IntOrAuto::from(AUTO_SENTINEL)).unwrap(), json!("auto"));
        assert_eq!(serde_json::from_value::<IntOrAuto>(json!("auto")).unwrap().as_sentinel(), -1);
        assert_eq!(serde_json::from_value::<IntOrAuto>(json!("AUTO")).unwrap(), IntOrAuto::Auto);
        assert_eq!(serde_json::from_value::<IntOrAuto>(json!("Auto")).unwrap(), IntOrAuto::Auto);
        assert_eq!(serde_json::from_value::<IntOrAuto>(json!(8)).unwrap(), IntOrAuto::Value(8));
        assert_eq!(serde_json::to_value(IntOrAuto::Value(8)).unwrap(), json!(8));
    }

    #[test]
    fn test_int_or_auto_rejects_other_tokens() {
        assert!(serde_json::from_value::<IntOrAuto>(json!("eight")).is_err());
        assert!(serde_json::from_value::<IntOrAuto>(json!(1.5)).is_err());
        assert!(serde_json::from_value::<IntOrAuto>(json!([1])).is_err());
    }

    #[test]
    fn test_int_or_auto_field() {
        let auto: Params = serde_json::from_value(json!({"batch_size": "aUtO"})).unwrap();
        assert_eq!(auto.batch_size, Some(AUTO_SENTINEL));
        assert_eq!(serde_json::to_value(&auto).unwrap(), json!({"batch_size": "auto"}));

        let number: Params = serde_json::from_value(json!({"batch_size": 16})).unwrap();
        assert_eq!(number.batch_size, Some(16));
        assert_eq!(serde_json::to_value(&number).unwrap(), json!({"batch_size": 16}));

        let null: Params = serde_json::from_value(json!({"batch_size": null})).unwrap();
        assert_eq!(null.batch_size, None);

        let missing: Params = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.batch_size, None);

        assert!(serde_json::from_value::<Params>(json!({"batch_size": "big"})).is_err());
    }

    #[test]
    fn test_string_or_number() {
        #[derive(Deserialize)]
        struct Code {
            #[serde(default, deserialize_with = "string_or_number")]
            code: Option<String>,
        }

        let text: Code = serde_json::from_value(json!({"code": "rate_limit"})).unwrap();
        assert_eq!(text.code.as_deref(), Some("rate_limit"));
        let number: Code = serde_json::from_value(json!({"code": 429})).unwrap();
        assert_eq!(number.code.as_deref(), Some("429"));
        let null: Code = serde_json::from_value(json!({"code": null})).unwrap();
        assert!(null.code.is_none());
        assert!(serde_json::from_value::<Code>(json!({"code": [1]})).is_err());
    }
}
