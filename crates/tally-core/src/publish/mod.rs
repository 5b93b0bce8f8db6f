//! Public report publishing: files on disk, coalescing, visibility toggles.

pub mod coalesce;
pub mod file_manager;
pub mod write_report;

pub use self::coalesce::{merge_run, ReportDocument};
pub use self::file_manager::{
    day_file_name, parse_day_file_name, sanitize, PublicReportFileManager, PublishError,
    COALESCED_REPORT_FILE,
};
pub use self::write_report::{write_daily_result, PublishJob};

use log::error;
use thiserror::Error;

use crate::domain::ReportId;
use crate::ports::report_store::{ReportStore, StoreError};

#[derive(Debug, Error)]
pub enum VisibilityError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Make a report public: flip the record flag, then write the data file.
///
/// If the write fails, the flag change is rolled back so the record and the
/// filesystem never disagree about what is published.
pub async fn set_report_public(
    store: &dyn ReportStore,
    files: &PublicReportFileManager,
    id: ReportId,
    data: &str,
) -> Result<(), VisibilityError> {
    store.set_public(id, true).await?;
    let path = files.public_report_path(&id.to_string(), false, true)?;
    if let Err(err) = files.write_data(&path, data) {
        if let Err(rollback) = store.set_public(id, false).await {
            error!("could not roll back public flag for {id}: {rollback}");
        }
        return Err(err.into());
    }
    Ok(())
}

/// Make a report private again: flip the flag, then remove the file. A
/// failed removal rolls the flag back, mirroring [`set_report_public`].
pub async fn set_report_private(
    store: &dyn ReportStore,
    files: &PublicReportFileManager,
    id: ReportId,
) -> Result<(), VisibilityError> {
    store.set_public(id, false).await?;
    let path = files.public_report_path(&id.to_string(), false, false)?;
    if let Err(err) = files.remove_file(&path) {
        if let Err(rollback) = store.set_public(id, true).await {
            error!("could not roll back public flag for {id}: {rollback}");
        }
        return Err(err.into());
    }
    Ok(())
}
