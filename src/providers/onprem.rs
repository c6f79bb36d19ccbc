use chrono::{DateTime, SecondsFormat, Utc};

use super::rest::RestApi;
use super::{BuildProvider, ResultFilter};
use crate::errors::TransportError;
use crate::model::{BuildDefinition, DefinitionKind, RawBuild, Scope, TestRunRecord};
use crate::types::{BuildUri, DefinitionId};

const DEFAULT_COLLECTION: &str = "DefaultCollection";

/// The on-premises server. Team projects are nested under project
/// collections, so every scope it emits carries its collection and every
/// request routes through it.
pub struct OnPremProvider {
    name: String,
    api: RestApi,
    collections: Vec<String>,
}

impl OnPremProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        username: &str,
        password: &str,
        collections: &[String],
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let collections = if collections.is_empty() {
            vec![DEFAULT_COLLECTION.to_string()]
        } else {
            collections.to_vec()
        };
        Ok(Self {
            name: name.to_string(),
            api: RestApi::new(base_url, username, password, timeout_secs)?,
            collections,
        })
    }

    fn collection<'a>(&'a self, scope: &'a Scope) -> &'a str {
        scope.collection.as_deref().unwrap_or(DEFAULT_COLLECTION)
    }
}

#[async_trait::async_trait]
impl BuildProvider for OnPremProvider {
    async fn scopes(&self) -> Result<Vec<Scope>, TransportError> {
        let mut scopes = Vec::new();
        for collection in &self.collections {
            let projects = self.api.projects(collection).await?;
            scopes.extend(
                projects
                    .into_iter()
                    .map(|p| p.into_scope(Some(collection.as_str()))),
            );
        }
        Ok(scopes)
    }

    async fn definitions(&self, scope: &Scope) -> Result<Vec<BuildDefinition>, TransportError> {
        self.api.definitions(self.collection(scope), &scope.name).await
    }

    async fn latest_build(
        &self,
        scope: &Scope,
        definition: &DefinitionId,
    ) -> Result<Option<RawBuild>, TransportError> {
        let builds = self
            .api
            .builds(
                self.collection(scope),
                &scope.name,
                &[
                    ("definitions", definition.as_str()),
                    ("queryOrder", "startTimeDescending"),
                    ("$top", "1"),
                ],
            )
            .await?;
        Ok(builds
            .into_iter()
            .max_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id))))
    }

    async fn builds_since(
        &self,
        scope: &Scope,
        cutoff: DateTime<Utc>,
        kind: DefinitionKind,
        definitions: &[DefinitionId],
    ) -> Result<Vec<RawBuild>, TransportError> {
        let ids = definitions
            .iter()
            .map(DefinitionId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let since = cutoff.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut query = vec![("minFinishTime", since.as_str()), ("definitions", ids.as_str())];
        if kind == DefinitionKind::Xaml {
            query.push(("type", "xaml"));
        }
        self.api
            .builds(self.collection(scope), &scope.name, &query)
            .await
    }

    async fn in_progress_builds(&self, scope: &Scope) -> Result<Vec<RawBuild>, TransportError> {
        self.api
            .builds(
                self.collection(scope),
                &scope.name,
                &[("statusFilter", "inProgress")],
            )
            .await
    }

    async fn test_runs(
        &self,
        scope: &Scope,
        build_uri: &BuildUri,
    ) -> Result<Vec<TestRunRecord>, TransportError> {
        self.api
            .test_runs(self.collection(scope), &scope.name, build_uri)
            .await
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
                self.collection(scope),
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
