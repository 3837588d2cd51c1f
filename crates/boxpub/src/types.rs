use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use boxpub_registry::{ApiOutcome, UploadTarget};

/// Account that owns published boxes.
pub const DEFAULT_OWNER: &str = "broadinstitute";

/// Virtualization backend the artifact targets.
pub const DEFAULT_PROVIDER: &str = "virtualbox";

/// Where the packer post-processor leaves the box file.
pub const DEFAULT_ARTIFACT: &str = "output-vagrant/package.box";

/// Credential file name, resolved next to the executable.
pub const TOKEN_FILE_NAME: &str = ".token";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxIdentifier {
    pub owner: String,
    pub name: String,
}

impl BoxIdentifier {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for BoxIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Caller input for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub box_name: String,
    pub version: String,
}

impl PublishRequest {
    pub fn new(box_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            box_name: box_name.into(),
            version: version.into(),
        }
    }
}

/// What to do when the artifact upload fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadPolicy {
    /// Report the failure and release anyway.
    #[default]
    Tolerant,
    /// Abort before releasing.
    FailFast,
}

impl fmt::Display for UploadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadPolicy::Tolerant => write!(f, "tolerant"),
            UploadPolicy::FailFast => write!(f, "fail-fast"),
        }
    }
}

/// All runtime knobs for a publish, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOptions {
    /// Registry API base, e.g. `https://app.vagrantup.com/api/v1`.
    pub api_base: String,
    pub owner: String,
    pub provider: String,
    pub artifact_path: PathBuf,
    /// Create the box as private when it does not exist yet.
    pub private: bool,
    pub short_description: Option<String>,
    /// Version description sent when the version is created.
    pub description: Option<String>,
    pub upload_policy: UploadPolicy,
    /// Overall HTTP request timeout; `None` means no timeout.
    pub timeout: Option<Duration>,
    /// Validate the credential against the registry before step one.
    pub check_auth: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            api_base: boxpub_registry::DEFAULT_API_BASE.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT),
            private: false,
            short_description: None,
            description: None,
            upload_policy: UploadPolicy::default(),
            timeout: None,
            check_auth: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStep {
    EnsureBox,
    EnsureVersion,
    EnsureProvider,
    #[serde(rename = "upload_target")]
    ObtainUploadTarget,
    UploadArtifact,
    ReleaseVersion,
}

impl PublishStep {
    /// Steps in execution order.
    pub const ALL: [PublishStep; 6] = [
        PublishStep::EnsureBox,
        PublishStep::EnsureVersion,
        PublishStep::EnsureProvider,
        PublishStep::ObtainUploadTarget,
        PublishStep::UploadArtifact,
        PublishStep::ReleaseVersion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStep::EnsureBox => "ensure_box",
            PublishStep::EnsureVersion => "ensure_version",
            PublishStep::EnsureProvider => "ensure_provider",
            PublishStep::ObtainUploadTarget => "upload_target",
            PublishStep::UploadArtifact => "upload_artifact",
            PublishStep::ReleaseVersion => "release_version",
        }
    }

    /// 1-based position in [`PublishStep::ALL`].
    pub fn position(&self) -> usize {
        PublishStep::ALL
            .iter()
            .position(|s| s == self)
            .map_or(0, |idx| idx + 1)
    }
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a run has advanced the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Start,
    BoxEnsured,
    VersionEnsured,
    ProviderEnsured,
    UploadTargetObtained,
    Uploaded,
    UploadFailed,
    Released,
    Done,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PublishState::Start => "start",
            PublishState::BoxEnsured => "box_ensured",
            PublishState::VersionEnsured => "version_ensured",
            PublishState::ProviderEnsured => "provider_ensured",
            PublishState::UploadTargetObtained => "upload_target_obtained",
            PublishState::Uploaded => "uploaded",
            PublishState::UploadFailed => "upload_failed",
            PublishState::Released => "released",
            PublishState::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    AlreadyExists,
    Failed { message: String },
}

impl From<ApiOutcome> for StepOutcome {
    fn from(outcome: ApiOutcome) -> Self {
        match outcome {
            ApiOutcome::Applied => StepOutcome::Applied,
            ApiOutcome::AlreadyExists => StepOutcome::AlreadyExists,
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Applied => write!(f, "ok"),
            StepOutcome::AlreadyExists => write!(f, "already exists"),
            StepOutcome::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Result of the upload step, kept as a value so the swallow policy is
/// visible in the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded { bytes: u64 },
    Failed { message: String },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Uploaded { bytes } => write!(f, "uploaded ({bytes} bytes)"),
            UploadOutcome::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: PublishStep,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    #[serde(rename = "box")]
    pub box_id: BoxIdentifier,
    pub version: String,
    pub provider: String,
    pub upload_policy: UploadPolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    pub upload: UploadOutcome,
    pub final_state: PublishState,
}

impl PublishReceipt {
    pub fn step(&self, step: PublishStep) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_identifier_displays_owner_and_name() {
        let id = BoxIdentifier::new("broadinstitute", "ubuntu-test");
        assert_eq!(id.to_string(), "broadinstitute/ubuntu-test");
    }

    #[test]
    fn default_options_use_deployment_constants() {
        let opts = PublishOptions::default();
        assert_eq!(opts.api_base, "https://app.vagrantup.com/api/v1");
        assert_eq!(opts.owner, "broadinstitute");
        assert_eq!(opts.provider, "virtualbox");
        assert_eq!(opts.artifact_path, PathBuf::from("output-vagrant/package.box"));
        assert_eq!(opts.upload_policy, UploadPolicy::Tolerant);
        assert!(opts.timeout.is_none());
        assert!(!opts.private);
    }

    #[test]
    fn steps_are_ordered() {
        let positions: Vec<usize> = PublishStep::ALL.iter().map(|s| s.position()).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(PublishStep::ReleaseVersion.to_string(), "release_version");
    }

    #[test]
    fn upload_policy_serializes_kebab_case() {
        let json = serde_json::to_string(&UploadPolicy::FailFast).expect("serialize");
        assert_eq!(json, "\"fail-fast\"");
        let parsed: UploadPolicy = serde_json::from_str("\"tolerant\"").expect("parse");
        assert_eq!(parsed, UploadPolicy::Tolerant);
    }

    #[test]
    fn step_record_flattens_outcome() {
        let record = StepRecord {
            step: PublishStep::EnsureBox,
            outcome: StepOutcome::AlreadyExists,
            duration_ms: 7,
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"step": "ensure_box", "outcome": "already_exists", "duration_ms": 7})
        );
    }

    #[test]
    fn outcome_display() {
        assert_eq!(StepOutcome::from(ApiOutcome::Applied).to_string(), "ok");
        assert_eq!(
            StepOutcome::from(ApiOutcome::AlreadyExists).to_string(),
            "already exists"
        );
        assert_eq!(
            UploadOutcome::Uploaded { bytes: 12 }.to_string(),
            "uploaded (12 bytes)"
        );
        assert!(!UploadOutcome::Failed {
            message: "x".into()
        }
        .is_uploaded());
    }
}
