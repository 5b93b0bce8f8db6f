//! Aggregate node: reduce per-user results into the requested views.
//!
//! Sums, averages and population standard deviations accumulate in exact
//! decimal arithmetic and round to 4 places half-up, so two deployments
//! aggregating the same inputs emit byte-identical documents. Binary floats
//! drift across platforms; money-grade decimals do not.

use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{
    AggregateOptions, AggregateValues, MetricValue, ReportResult, Timeseries, UserResult,
    UserResults,
};

/// The reducing aggregate kinds. Individual passthrough is not a reduction
/// and is handled separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Average,
    StdDeviation,
}

#[derive(Debug, Error)]
pub enum AggregationError {
    /// One submetric reports a plain number for some users and a timeseries
    /// for others. There is no defensible way to combine those, so the input
    /// is rejected rather than guessed at.
    #[error("submetric '{0}' mixes scalar and timeseries values")]
    MixedShapes(String),

    /// Standard deviation is a second pass: the average for the same inputs
    /// must be computed first and handed in.
    #[error("standard deviation needs a precomputed average for '{0}'")]
    MissingAverage(String),
}

/// The output-shaping node: takes one merged per-user mapping and produces
/// any combination of individual results, sum, average and standard
/// deviation over them.
#[derive(Debug, Clone)]
pub struct AggregateNode {
    pub options: AggregateOptions,
}

impl AggregateNode {
    pub fn finish(&self, users: &UserResults) -> Result<ReportResult, AggregationError> {
        let list: Vec<&UserResult> = users.values().collect();
        let mut result = ReportResult::default();

        if self.options.aggregate {
            let average = if self.options.average || self.options.std_deviation {
                Some(calculate(&list, Aggregation::Average, None)?)
            } else {
                None
            };

            if self.options.sum {
                result.sum = Some(calculate(&list, Aggregation::Sum, None)?);
            }
            if self.options.std_deviation {
                result.std_deviation = Some(calculate(
                    &list,
                    Aggregation::StdDeviation,
                    average.as_ref(),
                )?);
            }
            if self.options.average {
                result.average = average;
            }
        }

        if self.options.individual {
            result.individual = Some(users.clone());
        }

        Ok(result)
    }
}

/// Reduce a list of per-user results into one value per submetric.
///
/// Rules, applied per submetric key found across all users:
/// - timeseries values aggregate per date bucket independently;
/// - a value is excluded when its user is censored or the value is
///   null/missing, and excluded values do not count toward the denominator;
/// - Sum is the running total, Average is Sum over the included count (0
///   when nothing was included), StdDeviation is the population form
///   sqrt(sum((x - mean)^2) / count) with the mean taken from `average`;
/// - everything rounds to 4 decimal places, half-up.
pub fn calculate(
    users: &[&UserResult],
    kind: Aggregation,
    average: Option<&AggregateValues>,
) -> Result<AggregateValues, AggregationError> {
    let mut out = AggregateValues::new();
    for (submetric, series) in submetric_shapes(users)? {
        let value = if series {
            MetricValue::Timeseries(reduce_series(users, &submetric, kind, average)?)
        } else {
            MetricValue::Number(reduce_scalar(users, &submetric, kind, average)?)
        };
        out.insert(submetric, value);
    }
    Ok(out)
}

/// Union of submetric keys across users, with their shape.
///
/// A submetric nobody reported a concrete value for counts as scalar; it
/// reduces over an empty value set and comes out 0.
fn submetric_shapes(
    users: &[&UserResult],
) -> Result<BTreeMap<String, bool>, AggregationError> {
    let mut shapes: BTreeMap<String, Option<bool>> = BTreeMap::new();
    for user in users {
        for (key, value) in &user.values {
            let entry = shapes.entry(key.clone()).or_default();
            let observed = match value {
                MetricValue::Null => continue,
                MetricValue::Number(_) => false,
                MetricValue::Timeseries(_) => true,
            };
            match entry {
                None => *entry = Some(observed),
                Some(series) if *series != observed => {
                    return Err(AggregationError::MixedShapes(key.clone()));
                }
                Some(_) => {}
            }
        }
    }
    Ok(shapes
        .into_iter()
        .map(|(key, shape)| (key, shape.unwrap_or(false)))
        .collect())
}

fn reduce_scalar(
    users: &[&UserResult],
    submetric: &str,
    kind: Aggregation,
    average: Option<&AggregateValues>,
) -> Result<Decimal, AggregationError> {
    let mut included = Vec::new();
    for user in users {
        if user.censored {
            continue;
        }
        if let Some(MetricValue::Number(n)) = user.values.get(submetric) {
            included.push(*n);
        }
    }

    let reduced = match kind {
        Aggregation::Sum => included.iter().sum(),
        Aggregation::Average => mean(&included),
        Aggregation::StdDeviation => {
            let mean = scalar_average(average, submetric)?;
            std_deviation(&included, mean)
        }
    };
    Ok(round4(reduced))
}

fn reduce_series(
    users: &[&UserResult],
    submetric: &str,
    kind: Aggregation,
    average: Option<&AggregateValues>,
) -> Result<Timeseries, AggregationError> {
    // Bucket union spans every user reporting this series, censored ones
    // included, so a fully-censored bucket still shows up as 0.
    let mut buckets: BTreeMap<String, Vec<Decimal>> = BTreeMap::new();
    for user in users {
        if let Some(MetricValue::Timeseries(series)) = user.values.get(submetric) {
            for (bucket, value) in series {
                let slot = buckets.entry(bucket.clone()).or_default();
                if user.censored {
                    continue;
                }
                if let Some(n) = value {
                    slot.push(*n);
                }
            }
        }
    }

    let mut out = Timeseries::new();
    for (bucket, included) in buckets {
        let reduced = match kind {
            Aggregation::Sum => included.iter().sum(),
            Aggregation::Average => mean(&included),
            Aggregation::StdDeviation => {
                let mean = series_average(average, submetric, &bucket)?;
                std_deviation(&included, mean)
            }
        };
        out.insert(bucket, Some(round4(reduced)));
    }
    Ok(out)
}

fn mean(included: &[Decimal]) -> Decimal {
    if included.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = included.iter().sum();
    sum / Decimal::from(included.len() as u64)
}

/// Population standard deviation; 0 over an empty value set.
fn std_deviation(included: &[Decimal], mean: Decimal) -> Decimal {
    if included.is_empty() {
        return Decimal::ZERO;
    }
    let variance: Decimal = included
        .iter()
        .map(|x| (*x - mean) * (*x - mean))
        .sum::<Decimal>()
        / Decimal::from(included.len() as u64);
    variance.sqrt().unwrap_or(Decimal::ZERO)
}

fn scalar_average(
    average: Option<&AggregateValues>,
    submetric: &str,
) -> Result<Decimal, AggregationError> {
    match average.and_then(|avg| avg.get(submetric)) {
        Some(MetricValue::Number(n)) => Ok(*n),
        _ => Err(AggregationError::MissingAverage(submetric.to_string())),
    }
}

fn series_average(
    average: Option<&AggregateValues>,
    submetric: &str,
    bucket: &str,
) -> Result<Decimal, AggregationError> {
    match average.and_then(|avg| avg.get(submetric)) {
        Some(MetricValue::Timeseries(series)) => Ok(series
            .get(bucket)
            .copied()
            .flatten()
            .unwrap_or(Decimal::ZERO)),
        _ => Err(AggregationError::MissingAverage(submetric.to_string())),
    }
}

fn round4(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}
