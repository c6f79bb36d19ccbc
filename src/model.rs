use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{BuildId, BuildUri, DefinitionId, ScopeId};

/// Normalized build status. These six values are the only ones that ever
/// appear in a [`BuildSummary`]; the wire strings are the camelCase names
/// the backends use (`inProgress`, `partiallySucceeded`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
    PartiallySucceeded,
    Stopped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "notStarted",
            Status::InProgress => "inProgress",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
            Status::PartiallySucceeded => "partiallySucceeded",
            Status::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An organizational unit (team project) owning build definitions. On-premises
/// servers nest projects under a project collection; the hosted service does
/// not, so `collection` is `None` there.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub name: String,
    pub collection: Option<String>,
}

/// Modern pipelines versus the legacy XAML build type, which the backends
/// serve from a different endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Build,
    Xaml,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDefinition {
    pub id: DefinitionId,
    pub name: String,
    pub uri: String,
    pub kind: DefinitionKind,
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRef {
    pub id: DefinitionId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub display_name: String,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub requested_for: Requester,
}

/// One execution of a definition, as reported by a backend. Transient: owned
/// by a single scan call and discarded once a [`BuildSummary`] is produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBuild {
    pub id: BuildId,
    pub uri: BuildUri,
    pub definition: DefinitionRef,
    pub status: Status,
    /// When present, the result is authoritative and supersedes `status`.
    pub result: Option<Status>,
    pub start_time: DateTime<Utc>,
    /// Unset while the build is still running.
    pub finish_time: Option<DateTime<Utc>>,
    pub requested_for: Option<Requester>,
    /// Queue requests; fallback source for the requester when the build
    /// itself carries none.
    pub requests: Vec<BuildRequest>,
}

impl RawBuild {
    pub fn is_in_progress(&self) -> bool {
        self.status == Status::InProgress
    }

    /// Requester of record: the build's own, else the first queue request's.
    pub fn requester(&self) -> Option<&Requester> {
        self.requested_for
            .as_ref()
            .or_else(|| self.requests.first().map(|r| &r.requested_for))
    }
}

/// Test outcome bucket within a run's statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Passed,
    Failed,
    Inconclusive,
    Aborted,
    NotExecuted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCount {
    pub outcome: Outcome,
    pub count: u64,
}

/// Raw test-run data for one build. Backends report either outcome-tagged
/// statistics (`run_statistics`) or a pre-aggregated pair
/// (`passed_tests`/`total_tests`); the reconciler copes with both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunRecord {
    pub id: u64,
    pub run_statistics: Option<Vec<OutcomeCount>>,
    pub passed_tests: Option<u64>,
    pub total_tests: Option<u64>,
}

/// Normalized pass/total pair. `total == 0` means no test data was available,
/// which is distinct from "all tests failed".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: u64,
    pub total: u64,
}

impl TestCounts {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// The dashboard-facing summary of one definition's current build within one
/// scope. Produced by the orchestrator and owned by the caller thereafter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    /// Globally unique: backend tag + scope id + definition id, so ids never
    /// collide across backends or scopes.
    pub id: String,
    pub team_project: String,
    pub team_project_collection: Option<String>,
    pub build_definition: String,
    pub status: Status,
    pub start_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    /// Duration of the previous completed build, shown as an ETA proxy while
    /// a build is in progress. Absent otherwise, or when no completed build
    /// exists to compare against.
    #[serde(default, with = "duration_secs")]
    pub estimated_cycle_time: Option<Duration>,
    pub requested_by: Option<String>,
    pub requested_by_image_url: Option<String>,
    pub report_url: String,
    pub passed_tests: u64,
    pub total_tests: u64,
}

mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.num_seconds()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<i64>::deserialize(d)?.map(Duration::seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_wire_names_are_camel_case() {
        assert_eq!(
            serde_json::to_string(&Status::PartiallySucceeded).unwrap(),
            "\"partiallySucceeded\""
        );
        let parsed: Status = serde_json::from_str("\"inProgress\"").unwrap();
        assert_eq!(parsed, Status::InProgress);
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        assert!(serde_json::from_str::<Status>("\"queued\"").is_err());
    }

    #[test]
    fn requester_falls_back_to_first_queue_request() {
        let build = RawBuild {
            id: BuildId::new("1"),
            uri: BuildUri::new("vstfs:///Build/Build/1"),
            definition: DefinitionRef {
                id: DefinitionId::new("7"),
                name: "nightly".into(),
            },
            status: Status::Succeeded,
            result: Some(Status::Succeeded),
            start_time: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            finish_time: None,
            requested_for: None,
            requests: vec![BuildRequest {
                requested_for: Requester {
                    display_name: "Ada".into(),
                    image_url: None,
                },
            }],
        };
        assert_eq!(build.requester().unwrap().display_name, "Ada");
    }

    #[test]
    fn zero_total_means_no_test_data() {
        assert!(TestCounts::default().is_empty());
        assert!(!TestCounts { passed: 0, total: 3 }.is_empty());
    }

    #[test]
    fn summary_serializes_cycle_time_as_seconds() {
        let summary = BuildSummary {
            id: "vso47".into(),
            team_project: "web".into(),
            team_project_collection: None,
            build_definition: "ci".into(),
            status: Status::InProgress,
            start_time: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            finish_time: None,
            estimated_cycle_time: Some(Duration::seconds(90)),
            requested_by: Some("Ada".into()),
            requested_by_image_url: None,
            report_url: "https://example.test/web/_build#_a=log&buildUri=1".into(),
            passed_tests: 0,
            total_tests: 0,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["estimatedCycleTime"], 90);
    }
}
