//! Writing a finished run to public storage.
//!
//! Runs as its own unit of work after the owning report completes, so slow
//! filesystems or large payloads never delay the report's completion signal.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::ReportId;

use super::coalesce::ReportDocument;
use super::file_manager::{
    day_file_name, PublicReportFileManager, PublishError, COALESCED_REPORT_FILE,
};

/// Everything needed to publish one run's result.
#[derive(Debug, Clone)]
pub struct PublishJob {
    /// Directory owner: the recurring parent for child runs, the report
    /// itself otherwise.
    pub report_id: ReportId,

    /// The day this run stands for; names the per-day file.
    pub created: DateTime<Utc>,

    pub document: ReportDocument,
}

/// Write the run's per-day file, refresh the cumulative document, and prune
/// day files that have aged out.
pub fn write_daily_result(
    files: &PublicReportFileManager,
    job: &PublishJob,
    today: NaiveDate,
    retention_days: u32,
) -> Result<(), PublishError> {
    let report_id = job.report_id.to_string();
    let dir = files.public_report_path(&report_id, true, true)?;

    let day_file = dir.join(day_file_name(job.created.date_naive()));
    files.write_data(&day_file, &serde_json::to_string_pretty(&job.document)?)?;

    if let Some(full) = files.coalesce_recurrent_reports(&report_id)? {
        files.write_data(
            &dir.join(COALESCED_REPORT_FILE),
            &serde_json::to_string_pretty(&full)?,
        )?;
    }

    files.remove_old_report_files(&report_id, retention_days, today)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AggregateOptions, AggregateValues, CohortRef, MetricParameters, MetricValue,
        ReportParameters, ReportResult, TimeseriesChoice,
    };
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use ulid::Ulid;

    fn document(end: &str, value: &str) -> ReportDocument {
        let mut sum = AggregateValues::new();
        sum.insert(
            "edits".to_string(),
            MetricValue::Number(value.parse::<Decimal>().unwrap()),
        );
        ReportDocument {
            parameters: ReportParameters {
                name: "daily edits".to_string(),
                cohort: CohortRef {
                    id: 1,
                    name: None,
                    size: Some(2),
                },
                metric: MetricParameters {
                    name: "edits".to_string(),
                    start_date: "2024-03-01".parse().unwrap(),
                    end_date: end.parse().unwrap(),
                    timeseries: TimeseriesChoice::None,
                },
                recurrent: false,
                public: true,
                aggregation: AggregateOptions::default(),
            },
            result: ReportResult {
                sum: Some(sum),
                ..ReportResult::default()
            },
        }
    }

    #[test]
    fn day_files_accumulate_into_the_cumulative_document() {
        let tmp = tempfile::tempdir().unwrap();
        let files = PublicReportFileManager::new(tmp.path());
        let report_id = ReportId::from_ulid(Ulid::new());
        let today = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();

        for (day, value) in [(1, "10"), (2, "12")] {
            let job = PublishJob {
                report_id,
                created: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
                document: document(&format!("2024-03-0{day}"), value),
            };
            write_daily_result(&files, &job, today, 10).unwrap();
        }

        let dir = files
            .public_report_path(&report_id.to_string(), true, false)
            .unwrap();
        assert!(dir.join("2024-03-01").exists());
        assert!(dir.join("2024-03-02").exists());

        let full = files
            .coalesce_recurrent_reports(&report_id.to_string())
            .unwrap()
            .unwrap();
        let MetricValue::Timeseries(series) = &full.result.sum.as_ref().unwrap()["edits"]
        else {
            panic!("expected timeseries");
        };
        assert_eq!(series.len(), 2);
        assert_eq!(series["2024-03-01"], Some(Decimal::from(10)));
        assert_eq!(series["2024-03-02"], Some(Decimal::from(12)));
    }

    #[test]
    fn republishing_a_day_does_not_double_count() {
        let tmp = tempfile::tempdir().unwrap();
        let files = PublicReportFileManager::new(tmp.path());
        let report_id = ReportId::from_ulid(Ulid::new());
        let today = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();

        let job = PublishJob {
            report_id,
            created: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            document: document("2024-03-01", "10"),
        };
        write_daily_result(&files, &job, today, 10).unwrap();
        write_daily_result(&files, &job, today, 10).unwrap();

        let full = files
            .coalesce_recurrent_reports(&report_id.to_string())
            .unwrap()
            .unwrap();
        let MetricValue::Timeseries(series) = &full.result.sum.as_ref().unwrap()["edits"]
        else {
            panic!("expected timeseries");
        };
        assert_eq!(series.len(), 1);
        assert_eq!(series["2024-03-01"], Some(Decimal::from(10)));
    }
}
