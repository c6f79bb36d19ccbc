use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::BackendHttpClient;
use crate::errors::TransportError;
use crate::model::{
    BuildDefinition, BuildRequest, DefinitionKind, DefinitionRef, Outcome, OutcomeCount, RawBuild,
    Requester, Scope, Status, TestRunRecord,
};
use crate::types::{BuildId, BuildUri, DefinitionId, ScopeId};

/// Raw REST operations shared by the hosted and on-premises providers. The
/// two variants differ only in how they resolve the project collection for a
/// scope; everything below is parameterized on it.
pub(crate) struct RestApi {
    http: BackendHttpClient,
    base: Url,
    username: String,
    password: String,
}

/// Both backends wrap list responses in a `{"count": n, "value": [...]}`
/// envelope.
#[derive(Debug, Deserialize)]
struct ValueEnvelope<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProjectDto {
    id: String,
    name: String,
}

impl ProjectDto {
    pub fn into_scope(self, collection: Option<&str>) -> Scope {
        Scope {
            id: ScopeId::new(self.id),
            name: self.name,
            collection: collection.map(String::from),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionDto {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    /// Present on the wire only when the definition is disabled.
    #[serde(default)]
    queue_status: Option<String>,
}

impl DefinitionDto {
    fn into_definition(self) -> BuildDefinition {
        let enabled = self.queue_status.as_deref() != Some("disabled");
        let kind = match self.kind.as_deref() {
            Some("xaml") => DefinitionKind::Xaml,
            _ => DefinitionKind::Build,
        };
        BuildDefinition {
            id: DefinitionId::new(self.id),
            name: self.name,
            uri: self.uri,
            kind,
            enabled,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionRefDto {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDto {
    display_name: String,
    #[serde(default)]
    image_url: Option<String>,
}

impl IdentityDto {
    fn into_requester(self) -> Requester {
        Requester {
            display_name: self.display_name,
            image_url: self.image_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestDto {
    requested_for: IdentityDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildDto {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    uri: String,
    definition: DefinitionRefDto,
    status: Status,
    #[serde(default)]
    result: Option<Status>,
    start_time: DateTime<Utc>,
    #[serde(default)]
    finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    requested_for: Option<IdentityDto>,
    #[serde(default)]
    requests: Vec<RequestDto>,
}

impl BuildDto {
    fn into_raw(self) -> RawBuild {
        RawBuild {
            id: BuildId::new(self.id),
            uri: BuildUri::new(self.uri),
            definition: DefinitionRef {
                id: DefinitionId::new(self.definition.id),
                name: self.definition.name,
            },
            status: self.status,
            result: self.result,
            start_time: self.start_time,
            finish_time: self.finish_time,
            requested_for: self.requested_for.map(IdentityDto::into_requester),
            requests: self
                .requests
                .into_iter()
                .map(|r| BuildRequest {
                    requested_for: r.requested_for.into_requester(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunStatisticDto {
    outcome: String,
    count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestRunDto {
    id: u64,
    #[serde(default)]
    run_statistics: Option<Vec<RunStatisticDto>>,
    #[serde(default)]
    passed_tests: Option<u64>,
    #[serde(default)]
    total_tests: Option<u64>,
}

impl TestRunDto {
    fn into_record(self) -> TestRunRecord {
        TestRunRecord {
            id: self.id,
            run_statistics: self.run_statistics.map(|stats| {
                stats
                    .into_iter()
                    .map(|s| OutcomeCount {
                        outcome: parse_outcome(&s.outcome),
                        count: s.count,
                    })
                    .collect()
            }),
            passed_tests: self.passed_tests,
            total_tests: self.total_tests,
        }
    }
}

/// Only `Passed` changes the arithmetic; anything unrecognized still has to
/// count toward the total, so it lands in the catch-all bucket.
fn parse_outcome(raw: &str) -> Outcome {
    match raw {
        "Passed" => Outcome::Passed,
        "Failed" => Outcome::Failed,
        "Inconclusive" => Outcome::Inconclusive,
        "Aborted" => Outcome::Aborted,
        _ => Outcome::NotExecuted,
    }
}

/// Definition ids arrive as numbers from the modern endpoints and strings
/// from the legacy ones.
fn string_or_number<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    })
}

impl RestApi {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let base =
            Url::parse(base_url).map_err(|_| TransportError::BaseUrl(base_url.to_string()))?;
        Ok(Self {
            http: BackendHttpClient::new(timeout_secs)?,
            base,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn url(
        &self,
        collection: &str,
        segments: &[&str],
        query: &[(&str, &str)],
        api_version: &str,
    ) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| TransportError::BaseUrl(self.base.to_string()))?;
            path.pop_if_empty().push(collection);
            for segment in segments {
                path.push(segment);
            }
        }
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("api-version", api_version);
        }
        Ok(url)
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, TransportError> {
        log::debug!("GET {url}");
        let response = self
            .http
            .client()
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(TransportError::Status {
                status,
                url: url.to_string(),
                body,
            });
        }

        let envelope: ValueEnvelope<T> =
            response
                .json()
                .await
                .map_err(|err| TransportError::Decode {
                    url: url.to_string(),
                    message: err.to_string(),
                })?;
        Ok(envelope.value)
    }

    pub async fn projects(&self, collection: &str) -> Result<Vec<ProjectDto>, TransportError> {
        let url = self.url(collection, &["_apis", "projects"], &[], "1.0")?;
        self.get_list(url).await
    }

    pub async fn definitions(
        &self,
        collection: &str,
        project: &str,
    ) -> Result<Vec<BuildDefinition>, TransportError> {
        let url = self.url(
            collection,
            &[project, "_apis", "build", "definitions"],
            &[],
            "2.0",
        )?;
        let dtos: Vec<DefinitionDto> = self.get_list(url).await?;
        Ok(dtos
            .into_iter()
            .map(DefinitionDto::into_definition)
            .filter(|d| d.enabled)
            .collect())
    }

    pub async fn builds(
        &self,
        collection: &str,
        project: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<RawBuild>, TransportError> {
        let url = self.url(collection, &[project, "_apis", "build", "builds"], query, "2.0")?;
        let dtos: Vec<BuildDto> = self.get_list(url).await?;
        Ok(dtos.into_iter().map(BuildDto::into_raw).collect())
    }

    pub async fn test_runs(
        &self,
        collection: &str,
        project: &str,
        build_uri: &BuildUri,
    ) -> Result<Vec<TestRunRecord>, TransportError> {
        let url = self.url(
            collection,
            &[project, "_apis", "test", "runs"],
            &[
                ("buildUri", build_uri.as_str()),
                ("includeRunDetails", "true"),
            ],
            "1.0",
        )?;
        let dtos: Vec<TestRunDto> = self.get_list(url).await?;
        Ok(dtos.into_iter().map(TestRunDto::into_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn build_payload_decodes_into_raw_build() {
        let json = r#"{
            "id": 712,
            "uri": "vstfs:///Build/Build/712",
            "definition": {"id": 12, "name": "ci"},
            "status": "inProgress",
            "startTime": "2024-05-01T08:00:00Z",
            "requestedFor": {"displayName": "Ada", "imageUrl": "https://x.test/img?id=9"}
        }"#;
        let dto: BuildDto = serde_json::from_str(json).unwrap();
        let raw = dto.into_raw();
        assert_eq!(raw.id, BuildId::new("712"));
        assert_eq!(raw.definition.id, DefinitionId::new("12"));
        assert_eq!(raw.status, Status::InProgress);
        assert_eq!(raw.result, None);
        assert_eq!(
            raw.start_time,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );
        assert!(raw.finish_time.is_none());
        assert_eq!(raw.requester().unwrap().display_name, "Ada");
    }

    #[test]
    fn disabled_definitions_are_marked() {
        let json = r#"{"id": "44", "name": "old", "queueStatus": "disabled"}"#;
        let dto: DefinitionDto = serde_json::from_str(json).unwrap();
        assert!(!dto.into_definition().enabled);
    }

    #[test]
    fn xaml_type_maps_to_legacy_kind() {
        let json = r#"{"id": 3, "name": "msbuild", "type": "xaml"}"#;
        let dto: DefinitionDto = serde_json::from_str(json).unwrap();
        assert_eq!(dto.into_definition().kind, DefinitionKind::Xaml);
    }

    #[test]
    fn test_run_payload_keeps_both_shapes_apart() {
        let tagged = r#"{"id": 5, "runStatistics": [{"outcome": "Passed", "count": 7}]}"#;
        let dto: TestRunDto = serde_json::from_str(tagged).unwrap();
        let record = dto.into_record();
        assert_eq!(
            record.run_statistics.as_deref().unwrap(),
            &[OutcomeCount {
                outcome: Outcome::Passed,
                count: 7
            }]
        );
        assert!(record.passed_tests.is_none());

        let aggregated = r#"{"id": 6, "passedTests": 4, "totalTests": 5}"#;
        let dto: TestRunDto = serde_json::from_str(aggregated).unwrap();
        let record = dto.into_record();
        assert!(record.run_statistics.is_none());
        assert_eq!(record.passed_tests, Some(4));
        assert_eq!(record.total_tests, Some(5));
    }

    #[test]
    fn unknown_outcome_lands_in_catch_all_bucket() {
        assert_eq!(parse_outcome("Timeout"), Outcome::NotExecuted);
    }
}
