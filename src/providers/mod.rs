use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

pub mod hosted;
pub mod onprem;
pub(crate) mod rest;

use crate::config::{BackendConfig, BackendKind, BoardConfig};
use crate::errors::TransportError;
use crate::model::{BuildDefinition, DefinitionKind, RawBuild, Scope, TestRunRecord};
use crate::report_url::{DashboardUrls, ReportUrlBuilder};
use crate::types::{BuildUri, DefinitionId};

pub(crate) struct BackendHttpClient {
    client: Client,
}

impl BackendHttpClient {
    pub fn new(timeout_secs: u64) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Result filter for the cycle-time lookup: last clean build, or the fallback
/// pool of builds that at least ran to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultFilter {
    Succeeded,
    PartiallySucceededOrFailed,
}

/// One CI backend's raw build/test data, behind a uniform capability so the
/// orchestrator never branches on the backend variant. All operations may
/// fail with a transport error, which is fatal for the scan that issued them.
#[async_trait::async_trait]
pub trait BuildProvider: Send + Sync {
    /// Team projects visible to this backend. On-premises servers expand
    /// every configured project collection.
    async fn scopes(&self) -> Result<Vec<Scope>, TransportError>;

    /// Build definitions within a scope, disabled ones already excluded.
    async fn definitions(&self, scope: &Scope) -> Result<Vec<BuildDefinition>, TransportError>;

    /// The single most recent build of a definition, if any exist.
    async fn latest_build(
        &self,
        scope: &Scope,
        definition: &DefinitionId,
    ) -> Result<Option<RawBuild>, TransportError>;

    /// Builds of the given definitions finished on or after the cutoff. The
    /// kind selects the endpoint, since legacy XAML builds live elsewhere.
    async fn builds_since(
        &self,
        scope: &Scope,
        cutoff: DateTime<Utc>,
        kind: DefinitionKind,
        definitions: &[DefinitionId],
    ) -> Result<Vec<RawBuild>, TransportError>;

    /// Builds currently running in a scope.
    async fn in_progress_builds(&self, scope: &Scope) -> Result<Vec<RawBuild>, TransportError>;

    /// Test runs recorded against a build, joined by the build's URI.
    async fn test_runs(
        &self,
        scope: &Scope,
        build_uri: &BuildUri,
    ) -> Result<Vec<TestRunRecord>, TransportError>;

    /// Most recent completed build of a definition matching the filter.
    async fn completed_build(
        &self,
        scope: &Scope,
        definition: &DefinitionId,
        filter: ResultFilter,
    ) -> Result<Option<RawBuild>, TransportError>;

    /// Name of this backend, used in logs and diagnostics.
    fn name(&self) -> &str;
}

/// A configured backend: its provider plus the matching URL builder and the
/// tag that prefixes every summary id it produces.
#[derive(Clone)]
pub struct Backend {
    pub tag: String,
    pub provider: Arc<dyn BuildProvider>,
    pub urls: Arc<dyn ReportUrlBuilder>,
}

impl Backend {
    pub fn new(
        tag: impl Into<String>,
        provider: Arc<dyn BuildProvider>,
        urls: Arc<dyn ReportUrlBuilder>,
    ) -> Self {
        Self {
            tag: tag.into(),
            provider,
            urls,
        }
    }
}

/// Build one backend per config entry, selecting the hosted or on-premises
/// provider by its declared kind.
pub fn create_backends(config: &BoardConfig) -> Result<Vec<Backend>, TransportError> {
    config
        .backends
        .iter()
        .map(|entry| create_backend(entry, config.timeout_secs))
        .collect()
}

fn create_backend(entry: &BackendConfig, timeout_secs: u64) -> Result<Backend, TransportError> {
    let password = entry
        .credential()
        .ok_or_else(|| TransportError::MissingCredentials {
            backend: entry.name.clone(),
        })?;

    match entry.kind {
        BackendKind::Hosted => {
            let provider = hosted::HostedProvider::new(
                &entry.name,
                &entry.base_url,
                &entry.username,
                &password,
                timeout_secs,
            )?;
            let urls = DashboardUrls::hosted(&entry.base_url);
            Ok(Backend::new(&entry.name, Arc::new(provider), Arc::new(urls)))
        }
        BackendKind::Onprem => {
            let provider = onprem::OnPremProvider::new(
                &entry.name,
                &entry.base_url,
                &entry.username,
                &password,
                &entry.collections,
                timeout_secs,
            )?;
            let urls = DashboardUrls::onprem(&entry.base_url);
            Ok(Backend::new(&entry.name, Arc::new(provider), Arc::new(urls)))
        }
    }
}
