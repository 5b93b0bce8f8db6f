//! Validation leaf: reports bad configuration as a result, not a crash.

use serde_json::{json, Value};

use super::FAILURE_KEY;

/// Leaf standing in for the real computation when the metric or cohort
/// failed validation.
///
/// It always "succeeds", returning a `{"FAILURE": <message>}` payload. This
/// keeps join semantics uniform (every node produces a result) while still
/// surfacing the problem to the end user. None of these messages should
/// appear unless a caller bypasses the normal creation forms.
#[derive(Debug, Clone)]
pub struct ValidationLeaf {
    pub metric_valid: bool,
    pub cohort_valid: bool,
    pub metric_label: String,
    pub cohort_name: String,
}

impl ValidationLeaf {
    pub fn valid(&self) -> bool {
        self.metric_valid && self.cohort_valid
    }

    /// The payload this leaf produces when executed.
    pub fn failure_payload(&self) -> Value {
        let mut message = String::new();
        if !self.cohort_valid {
            message.push_str(&format!(
                "{} ran with invalid cohort {}\n",
                self.metric_label, self.cohort_name
            ));
        }
        if !self.metric_valid {
            message.push_str(&format!(
                "{} was incorrectly configured\n",
                self.metric_label
            ));
        }
        if message.is_empty() {
            message.push_str("invalid report configuration");
        }
        json!({ FAILURE_KEY: message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_names_the_broken_pieces() {
        let leaf = ValidationLeaf {
            metric_valid: false,
            cohort_valid: false,
            metric_label: "edits".to_string(),
            cohort_name: "test cohort".to_string(),
        };

        assert!(!leaf.valid());
        let payload = leaf.failure_payload();
        let message = payload[FAILURE_KEY].as_str().unwrap();
        assert!(message.contains("invalid cohort test cohort"));
        assert!(message.contains("edits was incorrectly configured"));
    }

    #[test]
    fn cohort_only_failure_skips_the_metric_line() {
        let leaf = ValidationLeaf {
            metric_valid: true,
            cohort_valid: false,
            metric_label: "edits".to_string(),
            cohort_name: "raw upload".to_string(),
        };

        let payload = leaf.failure_payload();
        let message = payload[FAILURE_KEY].as_str().unwrap();
        assert!(message.contains("invalid cohort"));
        assert!(!message.contains("incorrectly configured"));
    }
}
