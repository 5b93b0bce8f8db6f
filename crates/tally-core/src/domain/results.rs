//! Result document model: per-user metric values and aggregated views.

use rust_decimal::Decimal;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::ids::UserId;

/// Placeholder row key used when a metric returns nothing for a project.
pub const NO_RESULTS: &str = "no-results";

/// Key of one row in a per-user result mapping: `"<user_id>|<project>"`.
///
/// Kept as a plain string so sentinel rows (see [`NO_RESULTS`]) and future
/// key shapes pass through aggregation untouched; nothing downstream parses
/// the key back apart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserKey(String);

impl UserKey {
    pub fn new(user_id: UserId, project: &str) -> Self {
        Self(format!("{user_id}|{project}"))
    }

    pub fn no_results() -> Self {
        Self(NO_RESULTS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for UserKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = UserKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a user key string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<UserKey, E> {
                Ok(UserKey(v.to_string()))
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

/// Date-bucketed values for one submetric, ordered by bucket key.
pub type Timeseries = BTreeMap<String, Option<Decimal>>;

/// One submetric's value for one user.
///
/// Untagged on the wire: `null`, a number, or a date-keyed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Null,
    Number(Decimal),
    Timeseries(Timeseries),
}

impl MetricValue {
    pub fn is_timeseries(&self) -> bool {
        matches!(self, MetricValue::Timeseries(_))
    }
}

impl From<i64> for MetricValue {
    fn from(n: i64) -> Self {
        MetricValue::Number(Decimal::from(n))
    }
}

impl From<Decimal> for MetricValue {
    fn from(d: Decimal) -> Self {
        MetricValue::Number(d)
    }
}

/// Everything a metric reports for one user.
///
/// A censored user's values still appear in individual output but are
/// excluded from sum/average/standard-deviation accumulation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserResult {
    #[serde(default, skip_serializing_if = "is_false")]
    pub censored: bool,

    #[serde(flatten)]
    pub values: BTreeMap<String, MetricValue>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl UserResult {
    pub fn with_value(mut self, submetric: impl Into<String>, value: MetricValue) -> Self {
        self.values.insert(submetric.into(), value);
        self
    }

    pub fn censored(mut self) -> Self {
        self.censored = true;
        self
    }
}

/// Per-user results merged across every project of a cohort.
pub type UserResults = BTreeMap<UserKey, UserResult>;

/// Aggregated values per submetric (scalar or timeseries, mirroring input).
pub type AggregateValues = BTreeMap<String, MetricValue>;

/// The result document of one report run.
///
/// Keys on the wire are fixed: "Individual Results", "Sum", "Average" and
/// "Standard Deviation". All requested views co-exist in one document.
/// Unknown keys are rejected, which is how failure payloads are told apart
/// from real results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportResult {
    #[serde(
        rename = "Individual Results",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub individual: Option<UserResults>,

    #[serde(rename = "Sum", default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<AggregateValues>,

    #[serde(rename = "Average", default, skip_serializing_if = "Option::is_none")]
    pub average: Option<AggregateValues>,

    #[serde(
        rename = "Standard Deviation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub std_deviation: Option<AggregateValues>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn metric_value_wire_shapes() {
        let null: MetricValue = serde_json::from_str("null").unwrap();
        assert_eq!(null, MetricValue::Null);

        let number: MetricValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(number, MetricValue::Number(d("2.5")));

        let series: MetricValue =
            serde_json::from_str(r#"{"2024-03-01": 1, "2024-03-02": null}"#).unwrap();
        let MetricValue::Timeseries(map) = series else {
            panic!("expected timeseries");
        };
        assert_eq!(map.get("2024-03-01"), Some(&Some(d("1"))));
        assert_eq!(map.get("2024-03-02"), Some(&None));
    }

    #[test]
    fn censored_flag_round_trips_inside_the_user_map() {
        let user = UserResult::default()
            .with_value("edits", MetricValue::from(10))
            .censored();

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["censored"], serde_json::json!(true));
        assert_eq!(json["edits"], serde_json::json!(10.0));

        let back: UserResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn uncensored_user_omits_the_marker() {
        let user = UserResult::default().with_value("edits", MetricValue::from(3));
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("censored").is_none());
    }

    #[test]
    fn report_result_uses_fixed_labels() {
        let mut sum = AggregateValues::new();
        sum.insert("edits".to_string(), MetricValue::from(5));
        let result = ReportResult {
            sum: Some(sum),
            ..ReportResult::default()
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["Sum"]["edits"], serde_json::json!(5.0));
        assert!(json.get("Average").is_none());
        assert!(json.get("Individual Results").is_none());
    }

    #[test]
    fn user_key_formats_id_and_project() {
        let key = UserKey::new(UserId(123), "enwiki");
        assert_eq!(key.as_str(), "123|enwiki");
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            "\"123|enwiki\""
        );
    }
}
