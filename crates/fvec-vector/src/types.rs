//! Wire types for the vector-database REST API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fvec_models::VectorPoint;

/// `PUT /collections/{name}` body.
#[derive(Debug, Serialize)]
pub struct CreateCollectionRequest {
    pub vectors: VectorParams,
}

#[derive(Debug, Serialize)]
pub struct VectorParams {
    pub size: usize,
    pub distance: &'static str,
}

/// `PUT /collections/{name}/index` body.
#[derive(Debug, Serialize)]
pub struct CreateIndexRequest {
    pub field_name: String,
    pub field_schema: &'static str,
}

/// `PUT /collections/{name}/points` body.
#[derive(Debug, Serialize)]
pub struct UpsertRequest {
    pub points: Vec<PointStruct>,
}

/// One point on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointStruct {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

impl From<&VectorPoint> for PointStruct {
    fn from(p: &VectorPoint) -> Self {
        Self {
            id: p.id.to_string(),
            vector: p.vector.clone(),
            payload: serde_json::to_value(&p.payload).unwrap_or(Value::Null),
        }
    }
}

/// `POST /collections/{name}/points/count` body.
#[derive(Debug, Serialize)]
pub struct CountRequest {
    pub filter: Filter,
    pub exact: bool,
}

#[derive(Debug, Serialize)]
pub struct Filter {
    pub must: Vec<Condition>,
}

#[derive(Debug, Serialize)]
pub struct Condition {
    pub key: String,
    #[serde(rename = "match")]
    pub matches: MatchValue,
}

#[derive(Debug, Serialize)]
pub struct MatchValue {
    pub value: Value,
}

impl Filter {
    /// Exact-match filter on a single keyword field.
    pub fn by_field(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            must: vec![Condition {
                key: key.into(),
                matches: MatchValue {
                    value: value.into(),
                },
            }],
        }
    }
}

/// `POST /collections/{name}/points/scroll` body.
#[derive(Debug, Serialize)]
pub struct ScrollRequest {
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    pub with_payload: bool,
    pub with_vector: bool,
}

/// Generic response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub result: T,
}

#[derive(Debug, Deserialize)]
pub struct CountResult {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct ScrollResult {
    pub points: Vec<ScrolledPoint>,
    #[serde(default)]
    pub next_page_offset: Option<Value>,
}

/// One point read back through scroll.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrolledPoint {
    pub id: Value,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_filter_shape() {
        let req = CountRequest {
            filter: Filter::by_field("video_code", "ABC123"),
            exact: true,
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["filter"]["must"][0]["key"], "video_code");
        assert_eq!(json["filter"]["must"][0]["match"]["value"], "ABC123");
        assert_eq!(json["exact"], true);
    }

    #[test]
    fn test_point_struct_from_vector_point() {
        let point = VectorPoint::new("instagram", "ABC123", 1, 0.52, vec![0.5; 3]);
        let wire = PointStruct::from(&point);
        assert_eq!(wire.id, point.id.to_string());
        assert_eq!(wire.payload["video_code"], "ABC123");
    }
}
