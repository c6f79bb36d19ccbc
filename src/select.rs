use crate::model::RawBuild;

/// Picks the single build that best represents a definition's current state.
///
/// An in-progress build always outranks a completed one, even when a stale
/// completed build started later in clock time due to reordering in the
/// source feed. Within the candidate pool the latest start time wins; ties
/// are broken by build id so the choice is deterministic.
pub fn select_representative(builds: &[RawBuild]) -> Option<&RawBuild> {
    let pool: Vec<&RawBuild> = {
        let in_progress: Vec<&RawBuild> = builds.iter().filter(|b| b.is_in_progress()).collect();
        if in_progress.is_empty() {
            builds.iter().collect()
        } else {
            in_progress
        }
    };

    pool.into_iter()
        .max_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)))
}
