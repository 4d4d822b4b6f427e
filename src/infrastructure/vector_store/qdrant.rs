use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    condition::ConditionOneOf, point_id::PointIdOptions, value::Kind, vector_output,
    vectors_output::VectorsOptions, Condition, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition as QdrantField,
    FieldType, Filter, GeoBoundingBox as QdrantBoundingBox, GeoPoint as QdrantGeoPoint,
    GetPointsBuilder, ListValue, PointId, PointStruct, PointsIdsList, Query, QueryPointsBuilder,
    RetrievedPoint, Struct, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload as QdrantPayload, Qdrant};

use crate::domain::{
    ports::{validate_batch, VectorStore},
    DomainError, Embedding, FieldMatch, GeoPoint, ListingId, Payload, PayloadValue, SearchFilter,
    SearchHit, SearchPage, SearchQuery,
};
use crate::infrastructure::config::QdrantConfig;

/// Payload fields that filters run against, with the index type each one needs.
pub const PAYLOAD_INDEXES: [(&str, FieldType); 10] = [
    ("make", FieldType::Keyword),
    ("years", FieldType::Keyword),
    ("models", FieldType::Keyword),
    ("engines", FieldType::Keyword),
    ("category", FieldType::Keyword),
    ("subcategory", FieldType::Keyword),
    ("ad_category_id", FieldType::Integer),
    ("rock_count", FieldType::Integer),
    ("price", FieldType::Float),
    ("location", FieldType::Geo),
];

pub struct QdrantVectorStore {
    config: QdrantConfig,
    client: OnceLock<Qdrant>,
}

impl QdrantVectorStore {
    /// Creates an unconnected store. Every call fails with `NotInitialized` until `init`.
    pub fn new(config: QdrantConfig) -> Self {
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    pub fn is_initialized(&self) -> bool {
        self.client.get().is_some()
    }

    /// Connects, creates the collection if needed and makes sure every filter field is indexed.
    pub async fn init(&self) -> Result<(), DomainError> {
        if self.is_initialized() {
            return Ok(());
        }

        let mut builder = Qdrant::from_url(&self.config.url).api_key(self.config.api_key.clone());
        if self.config.skip_compatibility_check {
            builder = builder.skip_compatibility_check();
        }
        let client = builder
            .build()
            .map_err(|e| DomainError::external(format!("qdrant connect: {e}")))?;

        self.ensure_collection(&client).await?;
        self.ensure_payload_indexes(&client).await?;

        // a concurrent init may have won the race; its client is equivalent
        let _ = self.client.set(client);
        tracing::info!(collection = %self.config.collection, "qdrant vector store initialized");
        Ok(())
    }

    fn client(&self) -> Result<&Qdrant, DomainError> {
        self.client
            .get()
            .ok_or_else(|| DomainError::not_initialized("qdrant client"))
    }

    async fn ensure_collection(&self, client: &Qdrant) -> Result<(), DomainError> {
        let exists = client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        if !exists {
            client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| DomainError::external(e.to_string()))?;
            tracing::info!(
                collection = %self.config.collection,
                dimension = self.config.dimension,
                "qdrant collection created"
            );
        }

        Ok(())
    }

    async fn ensure_payload_indexes(&self, client: &Qdrant) -> Result<(), DomainError> {
        let info = client
            .collection_info(&self.config.collection)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;
        let existing = info
            .result
            .map(|info| info.payload_schema)
            .unwrap_or_default();

        for (field, field_type) in PAYLOAD_INDEXES {
            if existing.contains_key(field) {
                continue;
            }

            let result = client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(
                        &self.config.collection,
                        field,
                        field_type,
                    )
                    .wait(true),
                )
                .await;

            match result {
                Ok(_) => tracing::info!(field, "payload index created"),
                Err(e) if e.to_string().contains("already exists") => {
                    tracing::debug!(field, "payload index already exists")
                }
                Err(e) => {
                    return Err(DomainError::external(format!(
                        "create payload index {field}: {e}"
                    )))
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(
        &self,
        ids: &[ListingId],
        vectors: &[Embedding],
        payloads: &[Payload],
    ) -> Result<(), DomainError> {
        validate_batch(ids, vectors, payloads)?;
        let client = self.client()?;
        if ids.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = ids
            .iter()
            .zip(vectors)
            .zip(payloads)
            .map(|((id, vector), payload)| {
                PointStruct::new(*id, vector.as_slice().to_vec(), to_qdrant_payload(payload))
            })
            .collect();

        client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points).wait(true))
            .await
            .map_err(|e| DomainError::external(format!("qdrant upsert {ids:?}: {e}")))?;

        tracing::debug!(count = ids.len(), "points upserted");
        Ok(())
    }

    async fn delete(&self, id: ListingId) -> Result<(), DomainError> {
        let client = self.client()?;

        client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection)
                    .points(PointsIdsList {
                        ids: vec![PointId::from(id)],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| DomainError::external(format!("qdrant delete {id}: {e}")))?;

        Ok(())
    }

    async fn get(&self, ids: &[ListingId]) -> Result<Vec<Option<Embedding>>, DomainError> {
        let client = self.client()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(*id)).collect();
        let response = client
            .get_points(
                GetPointsBuilder::new(&self.config.collection, point_ids)
                    .with_vectors(true)
                    .with_payload(false),
            )
            .await
            .map_err(|e| DomainError::external(format!("qdrant get {ids:?}: {e}")))?;

        let mut found: HashMap<ListingId, Embedding> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point.id.as_ref().and_then(point_id_to_listing)?;
                Some((id, dense_vector(point)?))
            })
            .collect();

        Ok(ids.iter().map(|id| found.remove(id)).collect())
    }

    async fn query(&self, query: &SearchQuery) -> Result<SearchPage, DomainError> {
        let client = self.client()?;
        let offset = query.offset();
        if query.limit == 0 {
            return Ok(SearchPage::default());
        }

        let mut builder = QueryPointsBuilder::new(&self.config.collection)
            .query(Query::new_nearest(query.vector.as_slice().to_vec()))
            .limit(query.limit as u64)
            .offset(offset)
            .score_threshold(query.score_threshold)
            .with_payload(true);
        if let Some(filter) = &query.filter {
            builder = builder.filter(to_qdrant_filter(filter));
        }

        let response = client
            .query(builder)
            .await
            .map_err(|e| DomainError::external(format!("qdrant query: {e}")))?;

        let hits: Vec<SearchHit> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let listing_id = point.id.as_ref().and_then(point_id_to_listing)?;
                Some(SearchHit {
                    listing_id,
                    score: point.score,
                    payload: from_qdrant_payload(&point.payload),
                })
            })
            .collect();

        Ok(SearchPage::from_hits(hits, offset, query.limit))
    }
}

fn point_id_to_listing(point_id: &PointId) -> Option<ListingId> {
    match &point_id.point_id_options {
        Some(PointIdOptions::Num(id)) => Some(*id),
        _ => None,
    }
}

#[allow(deprecated)]
fn dense_vector(point: RetrievedPoint) -> Option<Embedding> {
    match point.vectors?.vectors_options? {
        VectorsOptions::Vector(output) => match output.vector {
            Some(vector_output::Vector::Dense(dense)) => Some(Embedding::new(dense.data)),
            Some(_) => None,
            None if !output.data.is_empty() => Some(Embedding::new(output.data)),
            None => None,
        },
        VectorsOptions::Vectors(_) => None,
    }
}

fn value(kind: Kind) -> Value {
    Value { kind: Some(kind) }
}

fn to_qdrant_value(payload_value: &PayloadValue) -> Value {
    match payload_value {
        PayloadValue::String(s) => value(Kind::StringValue(s.clone())),
        PayloadValue::Integer(i) => value(Kind::IntegerValue(*i)),
        PayloadValue::Float(f) => value(Kind::DoubleValue(*f)),
        PayloadValue::Bool(b) => value(Kind::BoolValue(*b)),
        PayloadValue::StringList(items) => value(Kind::ListValue(ListValue {
            values: items
                .iter()
                .map(|item| value(Kind::StringValue(item.clone())))
                .collect(),
        })),
        PayloadValue::Geo(point) => value(Kind::StructValue(Struct {
            fields: HashMap::from([
                ("lat".to_string(), value(Kind::DoubleValue(point.lat))),
                ("lon".to_string(), value(Kind::DoubleValue(point.lon))),
            ]),
        })),
    }
}

pub fn to_qdrant_payload(payload: &Payload) -> QdrantPayload {
    let fields: HashMap<String, Value> = payload
        .iter()
        .map(|(key, payload_value)| (key.clone(), to_qdrant_value(payload_value)))
        .collect();
    QdrantPayload::from(fields)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value.kind.as_ref()? {
        Kind::DoubleValue(f) => Some(*f),
        Kind::IntegerValue(i) => Some(*i as f64),
        _ => None,
    }
}

fn from_qdrant_value(value: &Value) -> Option<PayloadValue> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(PayloadValue::String(s.clone())),
        Kind::IntegerValue(i) => Some(PayloadValue::Integer(*i)),
        Kind::DoubleValue(f) => Some(PayloadValue::Float(*f)),
        Kind::BoolValue(b) => Some(PayloadValue::Bool(*b)),
        Kind::ListValue(list) => list
            .values
            .iter()
            .map(|item| match item.kind.as_ref()? {
                Kind::StringValue(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(PayloadValue::StringList),
        Kind::StructValue(fields) => {
            let lat = fields.fields.get("lat").and_then(as_f64)?;
            let lon = fields.fields.get("lon").and_then(as_f64)?;
            Some(PayloadValue::Geo(GeoPoint::new(lat, lon)))
        }
        Kind::NullValue(_) => None,
    }
}

/// Converts a point payload back into domain values. Fields of unsupported shape are dropped.
pub fn from_qdrant_payload(fields: &HashMap<String, Value>) -> Payload {
    fields
        .iter()
        .filter_map(|(key, v)| Some((key.clone(), from_qdrant_value(v)?)))
        .collect()
}

pub fn to_qdrant_filter(filter: &SearchFilter) -> Filter {
    let mut conditions: Vec<Condition> = filter
        .conditions
        .iter()
        .map(|condition| {
            let key = condition.key.clone();
            match &condition.matches {
                FieldMatch::Keyword(keyword) => Condition::matches(key, keyword.clone()),
                FieldMatch::AnyOf(keywords) => Condition::matches(key, keywords.clone()),
                FieldMatch::Integer(i) => Condition::matches(key, *i),
            }
        })
        .collect();

    if let Some((key, bbox)) = &filter.geo {
        let field = QdrantField {
            key: key.clone(),
            geo_bounding_box: Some(QdrantBoundingBox {
                top_left: Some(QdrantGeoPoint {
                    lat: bbox.max_lat,
                    lon: bbox.min_lon,
                }),
                bottom_right: Some(QdrantGeoPoint {
                    lat: bbox.min_lat,
                    lon: bbox.max_lon,
                }),
            }),
            ..Default::default()
        };
        conditions.push(Condition {
            condition_one_of: Some(ConditionOneOf::Field(field)),
        });
    }

    Filter::must(conditions)
}
