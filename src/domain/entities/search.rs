use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::{Embedding, GeoPoint, ListingId, Payload, PayloadValue};

/// Rectangle in lat/lon space, inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lon
            && point.lon <= self.max_lon
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldMatch {
    /// Exact keyword, or membership when the payload field is a list.
    Keyword(String),
    /// Any of the keywords.
    AnyOf(Vec<String>),
    Integer(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: String,
    pub matches: FieldMatch,
}

/// Vehicle-fit selection used by tree navigation and filtered search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleFit {
    pub make: Option<String>,
    pub year: Option<String>,
    pub model: Option<String>,
    pub engine: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

/// Conjunction of field matches and an optional geo bounding box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub conditions: Vec<FieldCondition>,
    pub geo: Option<(String, GeoBoundingBox)>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(FieldCondition {
            key: key.into(),
            matches: FieldMatch::Keyword(value.into()),
        });
        self
    }

    pub fn any_of<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.push(FieldCondition {
            key: key.into(),
            matches: FieldMatch::AnyOf(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    pub fn integer(mut self, key: impl Into<String>, value: i64) -> Self {
        self.conditions.push(FieldCondition {
            key: key.into(),
            matches: FieldMatch::Integer(value),
        });
        self
    }

    pub fn within(mut self, key: impl Into<String>, bbox: GeoBoundingBox) -> Self {
        self.geo = Some((key.into(), bbox));
        self
    }

    /// Filter for the listing `location` payload field.
    pub fn bounding_box(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self::new().within("location", GeoBoundingBox::new(min_lat, max_lat, min_lon, max_lon))
    }

    pub fn for_vehicle(fit: &VehicleFit) -> Self {
        fn non_empty(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        let mut filter = Self::new();
        if let Some(make) = non_empty(&fit.make) {
            filter = filter.keyword("make", make);
        }
        if let Some(year) = non_empty(&fit.year) {
            filter = filter.any_of("years", [year]);
        }
        if let Some(model) = non_empty(&fit.model) {
            filter = filter.any_of("models", [model]);
        }
        if let Some(engine) = non_empty(&fit.engine) {
            filter = filter.any_of("engines", [engine]);
        }
        if let Some(category) = non_empty(&fit.category) {
            filter = filter.keyword("category", category);
        }
        if let Some(subcategory) = non_empty(&fit.subcategory) {
            filter = filter.keyword("subcategory", subcategory);
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.geo.is_none()
    }

    pub fn matches(&self, payload: &Payload) -> bool {
        let fields_match = self.conditions.iter().all(|condition| {
            let Some(value) = payload.get(&condition.key) else {
                return false;
            };
            match &condition.matches {
                FieldMatch::Keyword(keyword) => value.has_keyword(keyword),
                FieldMatch::AnyOf(keywords) => keywords.iter().any(|k| value.has_keyword(k)),
                FieldMatch::Integer(expected) => value.as_integer() == Some(*expected),
            }
        });

        let geo_matches = match &self.geo {
            Some((key, bbox)) => payload
                .get(key)
                .and_then(PayloadValue::as_geo)
                .is_some_and(|point| bbox.contains(point)),
            None => true,
        };

        fields_match && geo_matches
    }
}

/// Similarity query against the vector store.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub vector: Embedding,
    pub filter: Option<SearchFilter>,
    pub limit: usize,
    pub cursor: Option<String>,
    pub score_threshold: f32,
}

impl SearchQuery {
    pub fn new(vector: Embedding, limit: usize) -> Self {
        Self {
            vector,
            filter: None,
            limit,
            cursor: None,
            score_threshold: 0.0,
        }
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = (!filter.is_empty()).then_some(filter);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn offset(&self) -> u64 {
        self.cursor.as_deref().map(decode_cursor).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub listing_id: ListingId,
    pub score: f32,
    pub payload: Payload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub next_cursor: Option<String>,
}

impl SearchPage {
    /// Builds a page, emitting a cursor only when a full page came back.
    pub fn from_hits(hits: Vec<SearchHit>, offset: u64, limit: usize) -> Self {
        let next_cursor = (limit > 0 && hits.len() >= limit)
            .then(|| encode_cursor(offset + hits.len() as u64));
        Self { hits, next_cursor }
    }
}

pub fn encode_cursor(offset: u64) -> String {
    STANDARD.encode(offset.to_string())
}

/// Decodes an opaque cursor. Anything that is not a valid encoding maps to offset 0.
pub fn decode_cursor(cursor: &str) -> u64 {
    let cursor = cursor.trim();
    if cursor.is_empty() {
        return 0;
    }
    STANDARD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| text.parse::<u64>().ok())
        .unwrap_or(0)
}
