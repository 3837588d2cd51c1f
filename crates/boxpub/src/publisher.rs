use std::time::Instant;

use chrono::Utc;

use boxpub_registry::{ApiOutcome, NewBox, RegistryClient, UploadTarget};

use crate::auth::Credential;
use crate::error::{PublishError, display_chain};
use crate::types::{
    BoxIdentifier, PublishOptions, PublishReceipt, PublishRequest, PublishState, PublishStep,
    StepOutcome, StepRecord, UploadOutcome, UploadPolicy,
};

pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);

    fn step_started(&mut self, _step: PublishStep) {}

    fn step_finished(&mut self, _record: &StepRecord) {}
}

/// Drives one publish run against the registry.
///
/// Built once from the request, the options and the credential; owns the
/// single HTTP client used for every step.
#[derive(Debug)]
pub struct Publisher {
    box_id: BoxIdentifier,
    version: String,
    options: PublishOptions,
    client: RegistryClient,
    state: PublishState,
}

impl Publisher {
    pub fn new(
        request: PublishRequest,
        options: PublishOptions,
        credential: &Credential,
    ) -> Result<Self, PublishError> {
        validate_request(&request)?;

        let client =
            RegistryClient::with_timeout(&options.api_base, credential.expose(), options.timeout)
                .map_err(PublishError::Client)?;

        Ok(Self {
            box_id: BoxIdentifier::new(options.owner.clone(), request.box_name),
            version: request.version,
            options,
            client,
            state: PublishState::Start,
        })
    }

    pub fn box_id(&self) -> &BoxIdentifier {
        &self.box_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    fn fail(&self, step: PublishStep, source: boxpub_registry::RegistryError) -> PublishError {
        PublishError::Step {
            step,
            reached: self.state,
            source,
        }
    }

    /// Check the credential; returns the registry username when reported.
    pub fn authenticate(&self) -> Result<Option<String>, PublishError> {
        self.client
            .authenticate()
            .map_err(PublishError::Authentication)
    }

    pub fn ensure_box(&mut self) -> Result<ApiOutcome, PublishError> {
        let new_box = NewBox {
            owner: &self.box_id.owner,
            name: &self.box_id.name,
            is_private: self.options.private,
            short_description: self.options.short_description.as_deref(),
        };
        let outcome = self
            .client
            .create_box(&new_box)
            .map_err(|e| self.fail(PublishStep::EnsureBox, e))?;
        self.state = PublishState::BoxEnsured;
        Ok(outcome)
    }

    pub fn ensure_version(&mut self) -> Result<ApiOutcome, PublishError> {
        let outcome = self
            .client
            .create_version(
                &self.box_id.owner,
                &self.box_id.name,
                &self.version,
                self.options.description.as_deref(),
            )
            .map_err(|e| self.fail(PublishStep::EnsureVersion, e))?;
        self.state = PublishState::VersionEnsured;
        Ok(outcome)
    }

    pub fn ensure_provider(&mut self) -> Result<ApiOutcome, PublishError> {
        let outcome = self
            .client
            .create_provider(
                &self.box_id.owner,
                &self.box_id.name,
                &self.version,
                &self.options.provider,
            )
            .map_err(|e| self.fail(PublishStep::EnsureProvider, e))?;
        self.state = PublishState::ProviderEnsured;
        Ok(outcome)
    }

    pub fn get_upload_target(&mut self) -> Result<UploadTarget, PublishError> {
        let target = self
            .client
            .upload_target(
                &self.box_id.owner,
                &self.box_id.name,
                &self.version,
                &self.options.provider,
            )
            .map_err(|e| self.fail(PublishStep::ObtainUploadTarget, e))?;
        self.state = PublishState::UploadTargetObtained;
        Ok(target)
    }

    /// PUT the artifact to `target`. Returns the number of bytes sent.
    ///
    /// Whether a failure here stops the run is decided by [`Publisher::run`]
    /// according to the upload policy.
    pub fn upload_artifact(&mut self, target: &UploadTarget) -> Result<u64, PublishError> {
        match self
            .client
            .upload_artifact(target, &self.options.artifact_path)
        {
            Ok(bytes) => {
                self.state = PublishState::Uploaded;
                Ok(bytes)
            }
            Err(e) => {
                let err = self.fail(PublishStep::UploadArtifact, e);
                self.state = PublishState::UploadFailed;
                Err(err)
            }
        }
    }

    pub fn release_version(&mut self) -> Result<ApiOutcome, PublishError> {
        let outcome = self
            .client
            .release_version(&self.box_id.owner, &self.box_id.name, &self.version)
            .map_err(|e| self.fail(PublishStep::ReleaseVersion, e))?;
        self.state = PublishState::Released;
        Ok(outcome)
    }

    fn run_step<T>(
        &mut self,
        step: PublishStep,
        trail: &mut Vec<StepRecord>,
        reporter: &mut dyn Reporter,
        action: impl FnOnce(&mut Self) -> Result<T, PublishError>,
        describe: impl FnOnce(&T) -> StepOutcome,
    ) -> Result<T, PublishError> {
        reporter.step_started(step);
        let start = Instant::now();
        let result = action(self);
        let outcome = match &result {
            Ok(value) => describe(value),
            Err(err) => StepOutcome::Failed {
                message: display_chain(err),
            },
        };
        let record = StepRecord {
            step,
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        reporter.step_finished(&record);
        trail.push(record);
        result
    }

    /// Execute the full sequence and return the receipt.
    ///
    /// Stops at the first fatal error. Completed steps are not rolled back;
    /// re-running is safe because every create treats 422 as success.
    pub fn run(mut self, reporter: &mut dyn Reporter) -> Result<PublishReceipt, PublishError> {
        let started_at = Utc::now();
        let mut steps = Vec::with_capacity(PublishStep::ALL.len());

        reporter.info(&format!(
            "publishing {} version {} ({}) to {}",
            self.box_id,
            self.version,
            self.options.provider,
            self.client.api_base()
        ));

        if self.options.check_auth {
            match self.authenticate() {
                Ok(Some(user)) => reporter.info(&format!("authenticated as {user}")),
                Ok(None) => reporter.info("credential accepted by registry"),
                Err(err) => {
                    reporter.error(&display_chain(&err));
                    return Err(err);
                }
            }
        }

        let result = self.run_sequence(&mut steps, reporter);
        let upload = match result {
            Ok(upload) => upload,
            Err(err) => {
                reporter.error(&display_chain(&err));
                return Err(err);
            }
        };

        self.state = PublishState::Done;
        reporter.info(&format!("released {} version {}", self.box_id, self.version));

        Ok(PublishReceipt {
            box_id: self.box_id,
            version: self.version,
            provider: self.options.provider,
            upload_policy: self.options.upload_policy,
            started_at,
            finished_at: Utc::now(),
            steps,
            upload,
            final_state: self.state,
        })
    }

    fn run_sequence(
        &mut self,
        steps: &mut Vec<StepRecord>,
        reporter: &mut dyn Reporter,
    ) -> Result<UploadOutcome, PublishError> {
        let from_api = |outcome: &ApiOutcome| StepOutcome::from(*outcome);

        self.run_step(PublishStep::EnsureBox, steps, reporter, Self::ensure_box, from_api)?;
        self.run_step(
            PublishStep::EnsureVersion,
            steps,
            reporter,
            Self::ensure_version,
            from_api,
        )?;
        self.run_step(
            PublishStep::EnsureProvider,
            steps,
            reporter,
            Self::ensure_provider,
            from_api,
        )?;
        let target = self.run_step(
            PublishStep::ObtainUploadTarget,
            steps,
            reporter,
            Self::get_upload_target,
            |_| StepOutcome::Applied,
        )?;

        let uploaded = self.run_step(
            PublishStep::UploadArtifact,
            steps,
            reporter,
            |p| p.upload_artifact(&target),
            |_| StepOutcome::Applied,
        );
        let upload = match uploaded {
            Ok(bytes) => UploadOutcome::Uploaded { bytes },
            Err(err) => match self.options.upload_policy {
                UploadPolicy::FailFast => return Err(err),
                UploadPolicy::Tolerant => {
                    let message = display_chain(&err);
                    reporter.warn(&format!(
                        "upload failed, releasing anyway (upload policy: tolerant): {message}"
                    ));
                    reporter.warn(
                        "the released version may have no downloadable artifact; \
                         use --upload-policy fail-fast to stop before release",
                    );
                    UploadOutcome::Failed { message }
                }
            },
        };

        self.run_step(
            PublishStep::ReleaseVersion,
            steps,
            reporter,
            Self::release_version,
            from_api,
        )?;

        Ok(upload)
    }
}

fn validate_request(request: &PublishRequest) -> Result<(), PublishError> {
    for (field, value) in [("box name", &request.box_name), ("version", &request.version)] {
        if value.trim().is_empty() {
            return Err(PublishError::InvalidRequest(format!("{field} cannot be empty")));
        }
        if value.contains('/') || value.chars().any(char::is_whitespace) {
            return Err(PublishError::InvalidRequest(format!(
                "{field} must not contain '/' or whitespace: {value:?}"
            )));
        }
        // URL path building drops dot segments, which would address a
        // different registry resource.
        if value == "." || value == ".." {
            return Err(PublishError::InvalidRequest(format!(
                "{field} cannot be {value:?}"
            )));
        }
    }
    Ok(())
}
