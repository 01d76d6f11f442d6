//! Structured query_range request and response.
//!
//! Timestamps and steps are milliseconds. The response mirrors the
//! Prometheus HTTP API envelope for `resultType: "matrix"`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

/// Status string of a successful response.
pub const STATUS_SUCCESS: &str = "success";

/// Result type produced by range queries.
pub const RESULT_TYPE_MATRIX: &str = "matrix";

/// A decoded range query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRangeRequest {
    /// Path the request was received on; reused when re-encoding.
    pub path: String,
    /// Start of the range, unix milliseconds.
    pub start: i64,
    /// End of the range (inclusive), unix milliseconds.
    pub end: i64,
    /// Resolution step, milliseconds.
    pub step: i64,
    /// Evaluation timeout forwarded to the backend.
    pub timeout: Option<Duration>,
    /// PromQL expression.
    pub query: String,
}

impl QueryRangeRequest {
    /// Copy of this request covering a different range.
    pub fn with_start_end(&self, start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            ..self.clone()
        }
    }

    /// Length of the queried range.
    pub fn range(&self) -> Duration {
        Duration::from_millis(self.end.saturating_sub(self.start).max(0) as u64)
    }
}

/// A decoded range query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRangeResponse {
    pub status: String,
    #[serde(default)]
    pub data: QueryRangeData,
    #[serde(rename = "errorType", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryRangeResponse {
    /// A successful matrix response holding `result`.
    pub fn success(result: Vec<SampleStream>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            data: QueryRangeData {
                result_type: RESULT_TYPE_MATRIX.to_string(),
                result,
            },
            error_type: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// The `data` member of a response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryRangeData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<SampleStream>,
}

/// One series and its samples.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleStream {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<Sample>,
}

/// A single point, encoded on the wire as `[<unix seconds>, "<value>"]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&(self.timestamp_ms as f64 / 1000.0))?;
        tuple.serialize_element(&format_value(self.value))?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SampleVisitor;

        impl<'de> Visitor<'de> for SampleVisitor {
            type Value = Sample;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [timestamp, \"value\"] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Sample, A::Error> {
                let seconds: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let raw: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| de::Error::custom(format!("invalid sample value {:?}", raw)))?;
                Ok(Sample {
                    timestamp_ms: (seconds * 1000.0).round() as i64,
                    value,
                })
            }
        }

        deserializer.deserialize_tuple(2, SampleVisitor)
    }
}

/// Merge sub-range responses (in time order) into one response.
///
/// Series are matched on their full label set. A sample is appended only
/// if it is newer than the last sample already kept for that series, so
/// overlapping boundaries do not produce duplicates.
pub fn merge_responses(responses: Vec<QueryRangeResponse>) -> QueryRangeResponse {
    let mut series: BTreeMap<BTreeMap<String, String>, Vec<Sample>> = BTreeMap::new();

    for response in responses {
        for stream in response.data.result {
            let samples = series.entry(stream.metric).or_default();
            for sample in stream.values {
                match samples.last() {
                    Some(last) if sample.timestamp_ms <= last.timestamp_ms => {}
                    _ => samples.push(sample),
                }
            }
        }
    }

    QueryRangeResponse::success(
        series
            .into_iter()
            .map(|(metric, values)| SampleStream { metric, values })
            .collect(),
    )
}
