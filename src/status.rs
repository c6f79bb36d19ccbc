use crate::model::{RawBuild, Status, TestCounts};

/// Base status for a summary: the result, when the backend reported one,
/// supersedes the live status field.
pub fn base_status(build: &RawBuild) -> Status {
    build.result.unwrap_or(build.status)
}

/// Whether test reconciliation should run for this build.
///
/// Policy, given rather than derived: builds reported as succeeded are
/// trusted without re-checking their test counts; only a partially-succeeded
/// or failed result is double-checked, as is a result-less build whose
/// status reads partially succeeded.
pub fn needs_test_check(build: &RawBuild) -> bool {
    match build.result {
        Some(Status::PartiallySucceeded) | Some(Status::Failed) => true,
        Some(_) => false,
        None => build.status == Status::PartiallySucceeded,
    }
}

/// Final status once test counts are known. A completed build with any
/// non-passing test is reclassified as partially succeeded, whatever the
/// backend's own verdict was. In-progress builds are never reclassified.
pub fn finalize(base: Status, counts: TestCounts) -> Status {
    if base != Status::InProgress && !counts.is_empty() && counts.total != counts.passed {
        Status::PartiallySucceeded
    } else {
        base
    }
}
