//! Test case record, session and scope types.
//!
//! Records are deserialized leniently: every field has a default, so a raw
//! candidate missing its title, steps or timestamps is still a usable record.
//! Field names follow the camelCase layout used by the record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rank::{Priority, Status};

/// Identity and similarity metadata attached to a processed record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DedupMetadata {
    /// SHA-256 of the canonical core tuple.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// SHA-256 of the canonical tuple without expected result and test data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loose_fingerprint: Option<String>,
    /// Hex-encoded SimHash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simhash: Option<String>,
    /// Pre-fingerprint signature found on old records. Read-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_signature: Option<String>,
}

impl DedupMetadata {
    /// Whether the exact and loose fingerprints and the SimHash are all set.
    pub fn is_complete(&self) -> bool {
        self.fingerprint.is_some() && self.loose_fingerprint.is_some() && self.simhash.is_some()
    }
}

/// A single ordered test step.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// 1-based position.
    pub step_number: u32,
    /// What the tester does.
    pub action: String,
    /// Input used by the step.
    pub test_data: String,
    /// What should happen.
    pub expected_result: String,
}

impl Step {
    /// Create a step with only an action.
    pub fn new(step_number: u32, action: impl Into<String>) -> Self {
        Self {
            step_number,
            action: action.into(),
            ..Default::default()
        }
    }

    /// Set the expected result.
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = expected.into();
        self
    }

    /// Set the test data.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.test_data = data.into();
        self
    }
}

/// Generators emit steps either as bare strings or as objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum StepRepr {
    Text(String),
    Full(StepFields),
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct StepFields {
    #[serde(deserialize_with = "lenient::number")]
    step_number: u32,
    #[serde(alias = "step", alias = "description", deserialize_with = "lenient::string")]
    action: String,
    #[serde(alias = "data", deserialize_with = "lenient::string")]
    test_data: String,
    #[serde(alias = "expected", deserialize_with = "lenient::string")]
    expected_result: String,
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match StepRepr::deserialize(deserializer)? {
            StepRepr::Text(action) => Step::new(0, action),
            StepRepr::Full(fields) => Step {
                step_number: fields.step_number,
                action: fields.action,
                test_data: fields.test_data,
                expected_result: fields.expected_result,
            },
        })
    }
}

/// Field deserializers that turn `null` and mistyped scalars into usable
/// values instead of failing the whole record.
mod lenient {
    use serde::{Deserialize, Deserializer};

    use super::{Priority, Status};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    impl Scalar {
        fn into_label(self) -> String {
            match self {
                Scalar::Text(text) => text,
                Scalar::Int(n) => n.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Bool(b) => b.to_string(),
            }
        }
    }

    /// Any scalar as text; `null` is empty.
    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Scalar>::deserialize(deserializer)?
            .map(Scalar::into_label)
            .unwrap_or_default())
    }

    /// A count given as a number or numeric string, e.g. `2`, `"2"` or
    /// `"v2"`. Anything unreadable is 0.
    pub fn number<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Scalar>::deserialize(deserializer)? {
            Some(Scalar::Int(n)) => u32::try_from(n).unwrap_or(0),
            Some(Scalar::Float(f)) if (0.0..=u32::MAX as f64).contains(&f) => f as u32,
            Some(Scalar::Text(text)) => text
                .trim()
                .trim_start_matches(['v', 'V'])
                .parse()
                .unwrap_or(0),
            _ => 0,
        })
    }

    /// A priority label, or a bare number read as `P<n>`.
    pub fn priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Scalar>::deserialize(deserializer)?.map(|value| match value {
            Scalar::Int(n) => Priority::parse(&format!("P{}", n)),
            other => Priority::from(other.into_label()),
        }))
    }

    pub fn status<'de, D>(deserializer: D) -> Result<Option<Status>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Scalar>::deserialize(deserializer)?
            .map(|value| Status::from(value.into_label())))
    }

    /// A list; `null` is empty.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }
}

/// The unit being deduplicated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TestCaseRecord {
    /// Unique identifier. Empty on raw candidates until ingest assigns one.
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub title: String,
    /// Functional area; the `section` of the canonical tuple.
    #[serde(alias = "section", deserialize_with = "lenient::string")]
    pub module: String,
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(deserialize_with = "lenient::string")]
    pub preconditions: String,
    #[serde(alias = "expected", deserialize_with = "lenient::string")]
    pub expected_result: String,
    #[serde(deserialize_with = "lenient::string")]
    pub test_data: String,
    #[serde(deserialize_with = "lenient::string")]
    pub remarks: String,
    #[serde(deserialize_with = "lenient::string")]
    pub notes: String,
    #[serde(deserialize_with = "lenient::string")]
    pub test_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub requirement_ref: String,
    #[serde(deserialize_with = "lenient::string")]
    pub source_document: String,
    #[serde(deserialize_with = "lenient::priority")]
    pub priority: Option<Priority>,
    #[serde(deserialize_with = "lenient::status")]
    pub status: Option<Status>,
    #[serde(deserialize_with = "lenient::list")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub steps: Vec<Step>,
    #[serde(deserialize_with = "lenient::string")]
    pub project_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub project_name: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::string")]
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::number")]
    pub version: u32,
    #[serde(flatten)]
    pub dedup: DedupMetadata,
}

impl TestCaseRecord {
    /// Create a record with a title and module.
    pub fn new(title: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            module: module.into(),
            ..Default::default()
        }
    }

    /// Set the ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Append steps built from plain action strings, numbered in order.
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for action in actions {
            let number = self.steps.len() as u32 + 1;
            self.steps.push(Step::new(number, action));
        }
        self
    }

    /// Replace the steps.
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    /// Set the record-level expected result.
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = expected.into();
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the creation time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Expected result used for identity: the record-level field, or the
    /// step expectations when the record carries none.
    pub fn effective_expected(&self) -> String {
        if !self.expected_result.trim().is_empty() {
            return self.expected_result.clone();
        }
        join_non_empty(self.steps.iter().map(|s| s.expected_result.as_str()))
    }

    /// Test data used for identity, with the same fallback as
    /// [`effective_expected`](Self::effective_expected).
    pub fn effective_test_data(&self) -> String {
        if !self.test_data.trim().is_empty() {
            return self.test_data.clone();
        }
        join_non_empty(self.steps.iter().map(|s| s.test_data.as_str()))
    }

    /// Sort key for "earliest created": missing timestamps sort last.
    pub fn created_sort_key(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn join_non_empty<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("|")
}

/// One ingest run's ordered list of records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub document_names: Vec<String>,
    #[serde(default)]
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub test_cases: Vec<TestCaseRecord>,
}

impl Session {
    /// Create an empty session for a project.
    pub fn new(id: impl Into<String>, project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project_id: project_id.into(),
            project_name: String::new(),
            document_names: Vec::new(),
            model: String::new(),
            created_at: now,
            updated_at: now,
            test_cases: Vec::new(),
        }
    }

    /// Set the records.
    pub fn with_cases(mut self, cases: Vec<TestCaseRecord>) -> Self {
        self.test_cases = cases;
        self
    }
}

/// Which records an operation sees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectScope {
    /// A single project.
    Project(String),
    /// Every project in the store.
    All,
}

impl ProjectScope {
    /// Parse a project argument; `"all"` selects every project.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("all") {
            ProjectScope::All
        } else {
            ProjectScope::Project(value.to_string())
        }
    }

    /// Whether a project ID falls inside this scope.
    pub fn contains(&self, project_id: &str) -> bool {
        match self {
            ProjectScope::Project(id) => id == project_id,
            ProjectScope::All => true,
        }
    }
}

impl std::fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectScope::Project(id) => f.write_str(id),
            ProjectScope::All => f.write_str("all"),
        }
    }
}
