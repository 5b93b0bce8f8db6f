//! Multi-project merge: per-project metric results into one mapping.
//!
//! A cohort can span several backing projects. The multi-project node fans
//! out one metric leaf per project and merges the per-project mappings back
//! into a single `{user_key: result}` view. Keys embed the project, so the
//! union is collision-free by construction.

use crate::domain::UserResults;

/// Merge per-project results in declaration order (later entries win on the
/// impossible case of a duplicate key).
pub fn merge(project_results: Vec<UserResults>) -> UserResults {
    let mut merged = UserResults::new();
    for results in project_results {
        merged.extend(results);
    }
    merged
}
