use chrono::Duration;

use crate::errors::TransportError;
use crate::model::Scope;
use crate::providers::{BuildProvider, ResultFilter};
use crate::types::DefinitionId;

/// Estimates how long an in-progress build will take, from the duration of
/// the definition's previous completed build: the last succeeded build, or
/// failing that the last partially-succeeded-or-failed one.
///
/// `Ok(None)` means no completed build exists to compare against; a lookup
/// failure propagates rather than masquerading as "absent".
pub async fn estimate_cycle_time(
    provider: &dyn BuildProvider,
    scope: &Scope,
    definition: &DefinitionId,
) -> Result<Option<Duration>, TransportError> {
    let previous = match provider
        .completed_build(scope, definition, ResultFilter::Succeeded)
        .await?
    {
        Some(build) => Some(build),
        None => {
            provider
                .completed_build(scope, definition, ResultFilter::PartiallySucceededOrFailed)
                .await?
        }
    };

    Ok(previous.and_then(|build| build.finish_time.map(|finish| finish - build.start_time)))
}
