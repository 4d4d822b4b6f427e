use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One typed value in a vector-store point payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PayloadValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    StringList(Vec<String>),
    Geo(GeoPoint),
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_geo(&self) -> Option<GeoPoint> {
        match self {
            Self::Geo(point) => Some(*point),
            _ => None,
        }
    }

    /// True when the value equals `keyword` or, for list values, contains it.
    pub fn has_keyword(&self, keyword: &str) -> bool {
        match self {
            Self::String(s) => s == keyword,
            Self::StringList(items) => items.iter().any(|item| item == keyword),
            _ => false,
        }
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for PayloadValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

impl From<GeoPoint> for PayloadValue {
    fn from(value: GeoPoint) -> Self {
        Self::Geo(value)
    }
}

/// Metadata payload attached to a vector-store point.
pub type Payload = BTreeMap<String, PayloadValue>;
