use chrono::{DateTime, SecondsFormat, Utc};

use super::rest::RestApi;
use super::{BuildProvider, ResultFilter};
use crate::errors::TransportError;
use crate::model::{BuildDefinition, DefinitionKind, RawBuild, Scope, TestRunRecord};
use crate::types::{BuildUri, DefinitionId};

/// The hosted cloud service. Everything lives under a single default
/// collection; authentication is basic (username + personal access token).
pub struct HostedProvider {
    name: String,
    api: RestApi,
}

const COLLECTION: &str = "DefaultCollection";

impl HostedProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        username: &str,
        token: &str,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            name: name.to_string(),
            api: RestApi::new(base_url, username, token, timeout_secs)?,
        })
    }
}

fn join_ids(definitions: &[DefinitionId]) -> String {
    definitions
        .iter()
        .map(DefinitionId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn cutoff_param(cutoff: DateTime<Utc>) -> String {
    cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Most recently started build wins; the feed is not reliably ordered.
fn most_recent(builds: Vec<RawBuild>) -> Option<RawBuild> {
    builds
        .into_iter()
        .max_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)))
}

#[async_trait::async_trait]
impl BuildProvider for HostedProvider {
    async fn scopes(&self) -> Result<Vec<Scope>, TransportError> {
        let projects = self.api.projects(COLLECTION).await?;
        Ok(projects.into_iter().map(|p| p.into_scope(None)).collect())
    }

    async fn definitions(&self, scope: &Scope) -> Result<Vec<BuildDefinition>, TransportError> {
        self.api.definitions(COLLECTION, &scope.name).await
    }

    async fn latest_build(
        &self,
        scope: &Scope,
        definition: &DefinitionId,
    ) -> Result<Option<RawBuild>, TransportError> {
        let builds = self
            .api
            .builds(
                COLLECTION,
                &scope.name,
                &[
                    ("definitions", definition.as_str()),
                    ("queryOrder", "startTimeDescending"),
                    ("$top", "1"),
                ],
            )
            .await?;
        Ok(most_recent(builds))
    }

    async fn builds_since(
        &self,
        scope: &Scope,
        cutoff: DateTime<Utc>,
        kind: DefinitionKind,
        definitions: &[DefinitionId],
    ) -> Result<Vec<RawBuild>, TransportError> {
        let ids = join_ids(definitions);
        let since = cutoff_param(cutoff);
        let mut query = vec![("minFinishTime", since.as_str()), ("definitions", ids.as_str())];
        if kind == DefinitionKind::Xaml {
            query.push(("type", "xaml"));
        }
        self.api.builds(COLLECTION, &scope.name, &query).await
    }

    async fn in_progress_builds(&self, scope: &Scope) -> Result<Vec<RawBuild>, TransportError> {
        self.api
            .builds(COLLECTION, &scope.name, &[("statusFilter", "inProgress")])
            .await
    }

    async fn test_runs(
        &self,
        scope: &Scope,
        build_uri: &BuildUri,
    ) -> Result<Vec<TestRunRecord>, TransportError> {
        self.api.test_runs(COLLECTION, &scope.name, build_uri).await
    }

    async fn completed_build(
        &self,
        scope: &Scope,
        definition: &DefinitionId,
        filter: ResultFilter,
    ) -> Result<Option<RawBuild>, TransportError> {
        let result_filter = match filter {
            ResultFilter::Succeeded => "succeeded",
            ResultFilter::PartiallySucceededOrFailed => "partiallySucceeded,failed",
        };
        let builds = self
            .api
            .builds(
                COLLECTION,
                &scope.name,
                &[
                    ("definitions", definition.as_str()),
                    ("statusFilter", "completed"),
                    ("resultFilter", result_filter),
                    ("queryOrder", "finishTimeDescending"),
                    ("$top", "1"),
                ],
            )
            .await?;
        Ok(builds.into_iter().next())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
