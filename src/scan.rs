use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinSet;

use crate::cycle;
use crate::errors::ScanError;
use crate::model::{
    BuildDefinition, BuildSummary, DefinitionKind, RawBuild, Scope, Status, TestCounts,
};
use crate::providers::Backend;
use crate::reconcile;
use crate::select;
use crate::status;
use crate::types::{BuildId, DefinitionId};

/// Drives the fan-out over backends, scopes, and definitions, and assembles
/// the normalized summary list. Workers return their own local results which
/// are joined here; nothing is accumulated through shared mutable state.
pub struct Aggregator {
    backends: Vec<Backend>,
    concurrency: usize,
}

type Worker = Pin<Box<dyn Future<Output = Result<Vec<BuildSummary>, ScanError>> + Send + 'static>>;

impl Aggregator {
    /// `concurrency` bounds in-flight provider queries per fan-out level.
    /// The remote APIs throttle nested parallelism hard, so the useful range
    /// is small; 1 serializes the work while keeping the worker structure.
    pub fn new(backends: Vec<Backend>, concurrency: usize) -> Self {
        Self {
            backends,
            concurrency: concurrency.max(1),
        }
    }

    /// Full scan: every scope, every enabled definition, latest build only.
    ///
    /// Zero summaries across all backends is an error, not an empty list: a
    /// normally non-empty backend answering with nothing means a call failed
    /// while reporting success.
    pub async fn full_scan(&self) -> Result<Vec<BuildSummary>, ScanError> {
        let mut summaries = Vec::new();
        for backend in &self.backends {
            match self.scan_backend(backend).await {
                Ok(batch) => summaries.extend(batch),
                Err(err) => {
                    log::error!("full scan of backend '{}' failed: {err}", backend.tag);
                    return Err(err);
                }
            }
        }
        if summaries.is_empty() {
            return Err(ScanError::EmptyResult);
        }
        Ok(summaries)
    }

    /// Polling scan: builds finished within the last `window` hours, plus
    /// whatever is currently running, reduced to one representative per
    /// definition. An empty result here is normal — nothing changed.
    pub async fn poll_since(&self, window: &str) -> Result<Vec<BuildSummary>, ScanError> {
        let span = parse_poll_window(window)?;
        let cutoff = Utc::now()
            .checked_sub_signed(span)
            .ok_or_else(|| ScanError::InvalidWindow(window.to_string()))?;

        let mut summaries = Vec::new();
        for backend in &self.backends {
            match self.poll_backend(backend, cutoff).await {
                Ok(batch) => summaries.extend(batch),
                Err(err) => {
                    log::error!("polling scan of backend '{}' failed: {err}", backend.tag);
                    return Err(err);
                }
            }
        }
        Ok(summaries)
    }

    async fn scan_backend(&self, backend: &Backend) -> Result<Vec<BuildSummary>, ScanError> {
        let scopes = backend.provider.scopes().await?;
        let limit = self.concurrency;
        let workers = scopes
            .into_iter()
            .map(|scope| {
                let backend = backend.clone();
                Box::pin(async move { scan_scope(backend, scope, limit).await }) as Worker
            })
            .collect();
        join_bounded(limit, workers).await
    }

    async fn poll_backend(
        &self,
        backend: &Backend,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BuildSummary>, ScanError> {
        let scopes = backend.provider.scopes().await?;
        let workers = scopes
            .into_iter()
            .map(|scope| {
                let backend = backend.clone();
                Box::pin(async move { poll_scope(backend, scope, cutoff).await }) as Worker
            })
            .collect();
        join_bounded(self.concurrency, workers).await
    }
}

/// The polling window is a count of hours measured back from now. Hour
/// counts that parse but exceed chrono's representable span are rejected
/// the same way as junk input rather than unwinding.
pub(crate) fn parse_poll_window(window: &str) -> Result<Duration, ScanError> {
    match window.trim().parse::<i64>() {
        Ok(hours) if hours > 0 => {
            Duration::try_hours(hours).ok_or_else(|| ScanError::InvalidWindow(window.to_string()))
        }
        _ => Err(ScanError::InvalidWindow(window.to_string())),
    }
}

/// Runs workers with at most `limit` in flight, joining their local results.
/// The first failure propagates; dropping the set aborts whatever is still
/// running, so a failed scan never leaks a partial list.
async fn join_bounded(limit: usize, workers: Vec<Worker>) -> Result<Vec<BuildSummary>, ScanError> {
    let limit = limit.max(1);
    let mut pending = workers.into_iter();
    let mut active: JoinSet<Result<Vec<BuildSummary>, ScanError>> = JoinSet::new();
    let mut out = Vec::new();

    loop {
        while active.len() < limit {
            match pending.next() {
                Some(worker) => {
                    active.spawn(worker);
                }
                None => break,
            }
        }
        match active.join_next().await {
            Some(joined) => out.extend(joined??),
            None => break,
        }
    }

    Ok(out)
}

async fn scan_scope(
    backend: Backend,
    scope: Scope,
    limit: usize,
) -> Result<Vec<BuildSummary>, ScanError> {
    let definitions = list_definitions(&backend, &scope).await?;
    let workers = definitions
        .into_iter()
        .map(|definition| {
            let backend = backend.clone();
            let scope = scope.clone();
            Box::pin(async move {
                let summary = latest_summary(&backend, &scope, &definition).await?;
                let batch: Vec<BuildSummary> = summary.into_iter().collect();
                Ok(batch)
            }) as Worker
        })
        .collect();
    join_bounded(limit, workers).await
}

async fn poll_scope(
    backend: Backend,
    scope: Scope,
    cutoff: DateTime<Utc>,
) -> Result<Vec<BuildSummary>, ScanError> {
    let definitions = list_definitions(&backend, &scope).await?;

    let modern: Vec<DefinitionId> = definition_ids(&definitions, DefinitionKind::Build);
    let legacy: Vec<DefinitionId> = definition_ids(&definitions, DefinitionKind::Xaml);

    let mut candidates = Vec::new();
    if !modern.is_empty() {
        candidates.extend(
            backend
                .provider
                .builds_since(&scope, cutoff, DefinitionKind::Build, &modern)
                .await
                .map_err(|err| log_scope_error(&backend, &scope, "finished-builds query", err))?,
        );
    }
    if !legacy.is_empty() {
        candidates.extend(
            backend
                .provider
                .builds_since(&scope, cutoff, DefinitionKind::Xaml, &legacy)
                .await
                .map_err(|err| log_scope_error(&backend, &scope, "legacy-builds query", err))?,
        );
    }
    let running = backend
        .provider
        .in_progress_builds(&scope)
        .await
        .map_err(|err| log_scope_error(&backend, &scope, "in-progress query", err))?;
    // Backends occasionally report a finish time on a build they still list
    // as running; only a truly unset finish time counts.
    candidates.extend(running.into_iter().filter(|b| b.finish_time.is_none()));

    let mut summaries = Vec::new();
    for build in reduce_candidates(candidates) {
        summaries.push(summarize(&backend, &scope, build).await?);
    }
    Ok(summaries)
}

async fn list_definitions(
    backend: &Backend,
    scope: &Scope,
) -> Result<Vec<BuildDefinition>, ScanError> {
    let definitions = backend
        .provider
        .definitions(scope)
        .await
        .map_err(|err| log_scope_error(backend, scope, "definition listing", err))?;
    Ok(definitions)
}

fn definition_ids(definitions: &[BuildDefinition], kind: DefinitionKind) -> Vec<DefinitionId> {
    definitions
        .iter()
        .filter(|d| d.kind == kind)
        .map(|d| d.id.clone())
        .collect()
}

fn log_scope_error(
    backend: &Backend,
    scope: &Scope,
    what: &str,
    err: crate::errors::TransportError,
) -> ScanError {
    log::error!(
        "backend '{}' scope '{}': {what} failed: {err}",
        backend.tag,
        scope.name
    );
    ScanError::Transport(err)
}

/// Reduces the unioned polling candidates: dedup by build id keeping the
/// most recently started duplicate, then one representative per definition.
fn reduce_candidates(builds: Vec<RawBuild>) -> Vec<RawBuild> {
    let mut by_id: HashMap<BuildId, RawBuild> = HashMap::new();
    for build in builds {
        match by_id.entry(build.id.clone()) {
            Entry::Occupied(mut entry) => {
                if build.start_time > entry.get().start_time {
                    entry.insert(build);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(build);
            }
        }
    }

    let mut by_definition: HashMap<DefinitionId, Vec<RawBuild>> = HashMap::new();
    for build in by_id.into_values() {
        by_definition
            .entry(build.definition.id.clone())
            .or_default()
            .push(build);
    }

    by_definition
        .into_values()
        .filter_map(|group| select::select_representative(&group).cloned())
        .collect()
}

async fn latest_summary(
    backend: &Backend,
    scope: &Scope,
    definition: &BuildDefinition,
) -> Result<Option<BuildSummary>, ScanError> {
    let latest = backend
        .provider
        .latest_build(scope, &definition.id)
        .await
        .map_err(|err| {
            log::error!(
                "backend '{}' scope '{}' definition '{}': latest-build query failed: {err}",
                backend.tag,
                scope.name,
                definition.name
            );
            ScanError::Transport(err)
        })?;
    match latest {
        Some(build) => Ok(Some(summarize(backend, scope, build).await?)),
        None => Ok(None),
    }
}

/// Converts one representative build into its dashboard summary, invoking the
/// status deriver, the test reconciler, and — for in-progress builds — the
/// cycle-time resolver.
async fn summarize(
    backend: &Backend,
    scope: &Scope,
    build: RawBuild,
) -> Result<BuildSummary, ScanError> {
    let base = status::base_status(&build);
    let in_progress = build.is_in_progress();

    let mut counts = TestCounts::default();
    if status::needs_test_check(&build) {
        let runs = backend
            .provider
            .test_runs(scope, &build.uri)
            .await
            .map_err(|err| log_scope_error(backend, scope, "test-run lookup", err))?;
        counts = reconcile::reconcile(&runs);
    }

    let status = if in_progress {
        Status::InProgress
    } else {
        status::finalize(base, counts)
    };

    let estimated_cycle_time = if in_progress {
        cycle::estimate_cycle_time(backend.provider.as_ref(), scope, &build.definition.id)
            .await
            .map_err(|err| log_scope_error(backend, scope, "cycle-time lookup", err))?
    } else {
        None
    };

    // In-progress builds link to the live log; completed ones to the summary.
    let report_url = backend.urls.report_url(scope, &build.uri, !in_progress);

    let requester = build.requester();
    let requested_by = requester.map(|r| display_name(&r.display_name));
    let requested_by_image_url = requester.map(|r| backend.urls.avatar_url(scope, r));

    Ok(BuildSummary {
        id: format!("{}{}{}", backend.tag, scope.id, build.definition.id),
        team_project: scope.name.clone(),
        team_project_collection: scope.collection.clone(),
        build_definition: build.definition.name.clone(),
        status,
        start_time: build.start_time,
        finish_time: build.finish_time,
        estimated_cycle_time,
        requested_by,
        requested_by_image_url,
        report_url,
        passed_tests: counts.passed,
        total_tests: counts.total,
    })
}

/// Builds queued by the collection's service identity show up with a bracketed
/// account name nobody wants on a dashboard.
fn display_name(name: &str) -> String {
    if name.starts_with("[DefaultCollection]") {
        "Service Account".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DefinitionRef;
    use crate::types::BuildUri;
    use chrono::TimeZone;

    fn raw(id: &str, definition: &str, status: Status, start_hour: u32) -> RawBuild {
        RawBuild {
            id: BuildId::new(id),
            uri: BuildUri::new(format!("vstfs:///Build/Build/{id}")),
            definition: DefinitionRef {
                id: DefinitionId::new(definition),
                name: format!("def-{definition}"),
            },
            status,
            result: None,
            start_time: Utc.with_ymd_and_hms(2024, 5, 1, start_hour, 0, 0).unwrap(),
            finish_time: None,
            requested_for: None,
            requests: Vec::new(),
        }
    }

    #[test]
    fn poll_window_parses_whole_hours() {
        assert_eq!(parse_poll_window("24").unwrap(), Duration::hours(24));
        assert_eq!(parse_poll_window(" 1 ").unwrap(), Duration::hours(1));
    }

    #[test]
    fn poll_window_rejects_junk_zero_and_negatives() {
        for bad in ["", "abc", "1.5", "0", "-3"] {
            assert!(matches!(
                parse_poll_window(bad),
                Err(ScanError::InvalidWindow(_))
            ));
        }
    }

    #[test]
    fn poll_window_beyond_representable_hours_is_rejected_not_a_panic() {
        for huge in ["100000000000000000", &i64::MAX.to_string()] {
            assert!(matches!(
                parse_poll_window(huge),
                Err(ScanError::InvalidWindow(_))
            ));
        }
    }

    #[test]
    fn duplicate_build_ids_keep_the_most_recently_started() {
        let stale = raw("42", "7", Status::Succeeded, 8);
        let fresh = raw("42", "7", Status::Succeeded, 10);
        let reduced = reduce_candidates(vec![stale, fresh.clone()]);
        assert_eq!(reduced, vec![fresh]);
    }

    #[test]
    fn one_representative_per_definition() {
        let builds = vec![
            raw("1", "7", Status::Succeeded, 8),
            raw("2", "7", Status::InProgress, 7),
            raw("3", "9", Status::Failed, 9),
        ];
        let mut reduced = reduce_candidates(builds);
        reduced.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(reduced.len(), 2);
        // Definition 7 keeps its in-progress build despite the later start
        // of the completed one.
        assert_eq!(reduced[0].id, BuildId::new("2"));
        assert_eq!(reduced[1].id, BuildId::new("3"));
    }

    #[test]
    fn bracketed_service_identity_is_aliased() {
        assert_eq!(display_name("[DefaultCollection]\\svc"), "Service Account");
        assert_eq!(display_name("Ada Lovelace"), "Ada Lovelace");
    }
}
