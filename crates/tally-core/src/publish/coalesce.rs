//! Coalescing: merge per-day result documents into one rolling document.

use serde::{Deserialize, Serialize};

use crate::domain::{AggregateValues, MetricValue, ReportParameters, ReportResult, Timeseries};

/// A published result document: one run's parameters and result.
///
/// Per-day files and the cumulative file share this shape. In the cumulative
/// document every leaf value is date-bucketed, whatever shape the source
/// metric produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub parameters: ReportParameters,
    pub result: ReportResult,
}

/// Merge one run's document into the accumulator.
///
/// A non-timeseries run is first reshaped so each scalar value becomes a
/// one-entry `{end_date: value}` mapping; after that the accumulator is
/// always timeseries-shaped. Parameters are overwritten wholesale by the
/// latest run seen; result leaves are unioned per date key, last writer
/// wins. Merging keys on the parameter-declared date, so feeding the same
/// day's file in twice changes nothing.
pub fn merge_run(coalesced: &mut Option<ReportDocument>, mut document: ReportDocument) {
    if document.parameters.metric.timeseries.is_none() {
        let date = document
            .parameters
            .metric
            .end_date
            .format("%Y-%m-%d")
            .to_string();
        reshape_result(&mut document.result, &date);
    }

    match coalesced {
        None => *coalesced = Some(document),
        Some(accumulated) => {
            accumulated.parameters = document.parameters;
            merge_result(&mut accumulated.result, document.result);
        }
    }
}

/// Wrap every scalar leaf into a one-entry timeseries keyed by `date`.
/// Values that already are timeseries pass through untouched.
fn reshape_result(result: &mut ReportResult, date: &str) {
    for aggregate in [&mut result.sum, &mut result.average, &mut result.std_deviation] {
        if let Some(values) = aggregate {
            for value in values.values_mut() {
                reshape_value(value, date);
            }
        }
    }
    if let Some(individual) = &mut result.individual {
        for user in individual.values_mut() {
            for value in user.values.values_mut() {
                reshape_value(value, date);
            }
        }
    }
}

fn reshape_value(value: &mut MetricValue, date: &str) {
    let scalar = match value {
        MetricValue::Timeseries(_) => return,
        MetricValue::Number(n) => Some(*n),
        MetricValue::Null => None,
    };
    let mut series = Timeseries::new();
    series.insert(date.to_string(), scalar);
    *value = MetricValue::Timeseries(series);
}

fn merge_result(accumulated: &mut ReportResult, incoming: ReportResult) {
    merge_aggregate(&mut accumulated.sum, incoming.sum);
    merge_aggregate(&mut accumulated.average, incoming.average);
    merge_aggregate(&mut accumulated.std_deviation, incoming.std_deviation);

    if let Some(users) = incoming.individual {
        let merged = accumulated.individual.get_or_insert_default();
        for (key, user) in users {
            let entry = merged.entry(key).or_default();
            entry.censored = user.censored;
            merge_values(&mut entry.values, user.values);
        }
    }
}

fn merge_aggregate(accumulated: &mut Option<AggregateValues>, incoming: Option<AggregateValues>) {
    if let Some(values) = incoming {
        merge_values(accumulated.get_or_insert_default(), values);
    }
}

/// Union per submetric; date keys inside a timeseries union with last
/// writer winning.
fn merge_values(accumulated: &mut AggregateValues, incoming: AggregateValues) {
    use std::collections::btree_map::Entry;

    for (submetric, value) in incoming {
        match accumulated.entry(submetric) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                (MetricValue::Timeseries(existing), MetricValue::Timeseries(series)) => {
                    existing.extend(series);
                }
                (existing, value) => *existing = value,
            },
        }
    }
}
