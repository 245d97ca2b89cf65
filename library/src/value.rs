//! Typed values carried by plugs and contexts.

use std::collections::BTreeMap;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::hash::{Hash, Hasher};

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Vec2 {
    pub x: OrderedFloat<f64>,
    pub y: OrderedFloat<f64>,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: OrderedFloat(x),
            y: OrderedFloat(y),
        }
    }
}

/// Linear RGBA color.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Color {
    pub r: OrderedFloat<f64>,
    pub g: OrderedFloat<f64>,
    pub b: OrderedFloat<f64>,
    pub a: OrderedFloat<f64>,
}

impl Color {
    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: OrderedFloat(r),
            g: OrderedFloat(g),
            b: OrderedFloat(b),
            a: OrderedFloat(a),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

/// Data type of a plug (and of the values it may hold).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Floating point scalar (f64)
    Number,
    /// Integer value (i64)
    Integer,
    /// Text string
    String,
    /// Boolean value
    Boolean,
    /// 2D vector
    Vec2,
    /// RGBA color
    Color,
    /// Scene path (`/world/geo/sphere` as a list of names)
    Path,
    /// List of values
    Array,
    /// Named values; also the value type of compound plugs
    Map,
    /// Opaque byte blob
    Bytes,
    /// Accepts any type
    Any,
}

impl ValueType {
    /// Whether a value of type `other` may be stored in a slot of this type.
    pub fn accepts(self, other: ValueType) -> bool {
        self == ValueType::Any || other == ValueType::Any || self == other
    }

    /// Value used by input plugs that were declared without a default.
    pub fn default_value(self) -> Option<Value> {
        match self {
            ValueType::Number => Some(Value::Number(OrderedFloat(0.0))),
            ValueType::Integer => Some(Value::Integer(0)),
            ValueType::String => Some(Value::String(String::new())),
            ValueType::Boolean => Some(Value::Boolean(false)),
            ValueType::Vec2 => Some(Value::Vec2(Vec2::default())),
            ValueType::Color => Some(Value::Color(Color::default())),
            ValueType::Path => Some(Value::Path(Vec::new())),
            ValueType::Array => Some(Value::Array(Vec::new())),
            ValueType::Map => Some(Value::Map(BTreeMap::new())),
            ValueType::Bytes => Some(Value::Bytes(Vec::new())),
            ValueType::Any => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Vec2 => "vec2",
            ValueType::Color => "color",
            ValueType::Path => "path",
            ValueType::Array => "array",
            ValueType::Map => "map",
            ValueType::Bytes => "bytes",
            ValueType::Any => "any",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    Number(OrderedFloat<f64>),
    Integer(i64),
    String(String),
    Boolean(bool),
    Vec2(Vec2),
    Color(Color),
    Path(Vec<String>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Number(_) => ValueType::Number,
            Value::Integer(_) => ValueType::Integer,
            Value::String(_) => ValueType::String,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Vec2(_) => ValueType::Vec2,
            Value::Color(_) => ValueType::Color,
            Value::Path(_) => ValueType::Path,
            Value::Array(_) => ValueType::Array,
            Value::Map(_) => ValueType::Map,
            Value::Bytes(_) => ValueType::Bytes,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.into_inner()),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&[String]> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Parses `/a/b/c` into a path value. The root `/` is the empty path.
    pub fn path(text: &str) -> Self {
        Value::Path(
            text.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Approximate heap footprint in bytes, used for cost-weighted eviction.
    pub fn cost(&self) -> usize {
        let inline = std::mem::size_of::<Value>();
        inline
            + match self {
                Value::String(s) => s.len(),
                Value::Path(p) => p.iter().map(|s| s.len() + std::mem::size_of::<String>()).sum(),
                Value::Array(items) => items.iter().map(Value::cost).sum(),
                Value::Map(map) => map.iter().map(|(k, v)| k.len() + v.cost()).sum(),
                Value::Bytes(b) => b.len(),
                _ => 0,
            }
    }

    /// Content hash of the value alone.
    pub fn content_hash(&self) -> Hash {
        let mut h = Hasher::new();
        self.hash_into(&mut h);
        h.finish()
    }

    /// Bit-for-bit equality. Unlike `==`, tells `-0.0` from `0.0`.
    pub fn identical(&self, other: &Value) -> bool {
        self.content_hash() == other.content_hash()
    }

    /// Feeds an injective encoding of the value into `h`.
    pub fn hash_into(&self, h: &mut Hasher) {
        h.append_str(self.value_type_tag());
        match self {
            Value::Number(n) => {
                h.append_f64(n.into_inner());
            }
            Value::Integer(i) => {
                h.append_i64(*i);
            }
            Value::String(s) => {
                h.append_str(s);
            }
            Value::Boolean(b) => {
                h.append_bool(*b);
            }
            Value::Vec2(v) => {
                h.append_f64(v.x.into_inner()).append_f64(v.y.into_inner());
            }
            Value::Color(c) => {
                h.append_f64(c.r.into_inner())
                    .append_f64(c.g.into_inner())
                    .append_f64(c.b.into_inner())
                    .append_f64(c.a.into_inner());
            }
            Value::Path(p) => {
                h.append_u64(p.len() as u64);
                for segment in p {
                    h.append_str(segment);
                }
            }
            Value::Array(items) => {
                h.append_u64(items.len() as u64);
                for item in items {
                    item.hash_into(h);
                }
            }
            Value::Map(map) => {
                // BTreeMap iteration is sorted, so the encoding is deterministic.
                h.append_u64(map.len() as u64);
                for (key, value) in map {
                    h.append_str(key);
                    value.hash_into(h);
                }
            }
            Value::Bytes(b) => {
                h.append_bytes(b);
            }
        }
    }

    fn value_type_tag(&self) -> &'static str {
        match self {
            Value::Number(_) => "n",
            Value::Integer(_) => "i",
            Value::String(_) => "s",
            Value::Boolean(_) => "b",
            Value::Vec2(_) => "v2",
            Value::Color(_) => "c",
            Value::Path(_) => "p",
            Value::Array(_) => "a",
            Value::Map(_) => "m",
            Value::Bytes(_) => "y",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Integer(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Vec2(v) => write!(f, "({}, {})", v.x, v.y),
            Value::Color(c) => write!(f, "rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),
            Value::Path(p) => write!(f, "/{}", p.join("/")),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(OrderedFloat(value))
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(OrderedFloat(value as f64))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<Vec2> for Value {
    fn from(value: Vec2) -> Self {
        Value::Vec2(value)
    }
}

impl From<Color> for Value {
    fn from(value: Color) -> Self {
        Value::Color(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::String("null".to_string()),
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Number(OrderedFloat(f))
                } else {
                    Value::Number(OrderedFloat(0.0))
                }
            }
            serde_json::Value::String(s) => {
                // Scene paths are written as absolute strings in JSON contexts.
                if s.starts_with('/') {
                    Value::path(&s)
                } else {
                    Value::String(s)
                }
            }
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                if o.len() == 2 && o.contains_key("x") && o.contains_key("y") {
                    if let (Some(x), Some(y)) = (
                        o.get("x").and_then(|v| v.as_f64()),
                        o.get("y").and_then(|v| v.as_f64()),
                    ) {
                        return Value::Vec2(Vec2::new(x, y));
                    }
                }
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_and_integer_hash_differently() {
        assert_ne!(Value::from(1.0).content_hash(), Value::from(1i64).content_hash());
    }

    #[test]
    fn test_nested_arrays_are_unambiguous() {
        let a = Value::Array(vec![Value::Array(vec![1i64.into()]), 2i64.into()]);
        let b = Value::Array(vec![Value::Array(vec![1i64.into(), 2i64.into()])]);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_identical_tells_zero_signs_apart() {
        let zero = Value::from(0.0);
        let negative = Value::from(-0.0);
        assert_eq!(zero, negative);
        assert!(!zero.identical(&negative));
        assert!(zero.identical(&Value::from(0.0)));
    }

    #[test]
    fn test_path_parsing() {
        assert_eq!(
            Value::path("/world/geo"),
            Value::Path(vec!["world".to_string(), "geo".to_string()])
        );
        assert_eq!(Value::path("/"), Value::Path(Vec::new()));
    }

    #[test]
    fn test_json_conversion_infers_vec2_and_paths() {
        let json = serde_json::json!({"offset": {"x": 1.0, "y": 2.0}, "root": "/world", "frame": 3});
        let value = Value::from(json);
        let map = value.as_map().unwrap();
        assert_eq!(map["offset"], Value::Vec2(Vec2::new(1.0, 2.0)));
        assert_eq!(map["root"], Value::path("/world"));
        assert_eq!(map["frame"], Value::Integer(3));
    }

    #[test]
    fn test_cost_grows_with_payload() {
        let small = Value::Bytes(vec![0; 4]);
        let large = Value::Bytes(vec![0; 4096]);
        assert!(large.cost() > small.cost() + 4000);
    }

    #[test]
    fn test_any_accepts_everything() {
        assert!(ValueType::Any.accepts(ValueType::Color));
        assert!(ValueType::Number.accepts(ValueType::Any));
        assert!(!ValueType::Number.accepts(ValueType::Integer));
    }
}
