//! Configuration file support for boxpub (`.boxpub.toml`)
//!
//! The file is optional. Every value it sets can be overridden on the
//! command line, and every value it omits falls back to the built-in
//! deployment constants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::types::{PublishOptions, UploadPolicy};

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = ".boxpub.toml";

/// `[registry]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySection {
    /// Registry API base URL
    pub api_base: Option<String>,
    /// Account that owns the box
    pub owner: Option<String>,
}

/// `[box]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxSection {
    pub provider: Option<String>,
    /// Path to the packaged `.box` file. Relative paths resolve against the
    /// directory of the config file.
    pub artifact: Option<PathBuf>,
    #[serde(default)]
    pub private: bool,
    pub short_description: Option<String>,
    /// Description attached to newly created versions
    pub description: Option<String>,
}

/// `[credential]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialSection {
    /// Relative paths resolve against the directory of the config file.
    pub token_file: Option<PathBuf>,
}

/// `[upload]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSection {
    pub policy: Option<UploadPolicy>,
}

/// `[http]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpSection {
    /// Overall request timeout, e.g. `30s` or `10m`
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxpubConfig {
    #[serde(default)]
    pub check_auth: bool,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default, rename = "box")]
    pub box_section: BoxSection,
    #[serde(default)]
    pub credential: CredentialSection,
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub http: HttpSection,
    /// Directory of the file this config was loaded from.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_base: Option<String>,
    pub owner: Option<String>,
    pub provider: Option<String>,
    pub artifact: Option<PathBuf>,
    pub description: Option<String>,
    pub upload_policy: Option<UploadPolicy>,
    pub token_file: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub check_auth: bool,
}

impl BoxpubConfig {
    /// Load `.boxpub.toml` from `dir`.
    ///
    /// Returns `Ok(None)` if no config file exists.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(None);
        }
        Self::load_from_file(&config_path).map(Some)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: BoxpubConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf);

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(api_base) = &self.registry.api_base {
            validate_api_base(api_base).context("registry.api_base is invalid")?;
        }

        if let Some(owner) = &self.registry.owner
            && owner.trim().is_empty()
        {
            bail!("registry.owner cannot be empty");
        }

        if let Some(provider) = &self.box_section.provider
            && provider.trim().is_empty()
        {
            bail!("box.provider cannot be empty");
        }

        if let Some(artifact) = &self.box_section.artifact
            && artifact.as_os_str().is_empty()
        {
            bail!("box.artifact cannot be empty");
        }

        if let Some(token_file) = &self.credential.token_file
            && token_file.as_os_str().is_empty()
        {
            bail!("credential.token_file cannot be empty");
        }

        if let Some(timeout) = self.http.timeout
            && timeout.is_zero()
        {
            bail!("http.timeout must be greater than 0");
        }

        Ok(())
    }

    /// Build `PublishOptions` by merging CLI overrides with config file values.
    ///
    /// For `Option` fields: CLI value takes precedence; falls back to config,
    /// then to the built-in default. `check_auth` is on if either enables it.
    pub fn build_options(&self, cli: &CliOverrides) -> PublishOptions {
        let defaults = PublishOptions::default();

        PublishOptions {
            api_base: cli
                .api_base
                .clone()
                .or_else(|| self.registry.api_base.clone())
                .unwrap_or(defaults.api_base),
            owner: cli
                .owner
                .clone()
                .or_else(|| self.registry.owner.clone())
                .unwrap_or(defaults.owner),
            provider: cli
                .provider
                .clone()
                .or_else(|| self.box_section.provider.clone())
                .unwrap_or(defaults.provider),
            artifact_path: cli
                .artifact
                .clone()
                .or_else(|| self.box_section.artifact.as_deref().map(|p| self.resolve(p)))
                .unwrap_or(defaults.artifact_path),
            private: self.box_section.private,
            short_description: self.box_section.short_description.clone(),
            description: cli
                .description
                .clone()
                .or_else(|| self.box_section.description.clone()),
            upload_policy: cli
                .upload_policy
                .or(self.upload.policy)
                .unwrap_or(defaults.upload_policy),
            timeout: cli.timeout.or(self.http.timeout),
            check_auth: cli.check_auth || self.check_auth,
        }
    }

    /// Token file override, CLI first. `None` means "next to the executable".
    pub fn token_file(&self, cli: &CliOverrides) -> Option<PathBuf> {
        cli.token_file
            .clone()
            .or_else(|| self.credential.token_file.as_deref().map(|p| self.resolve(p)))
    }

    /// CLI paths stay relative to the working directory; config paths are
    /// relative to the config file.
    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Reject API bases that reqwest would not be able to request.
pub fn validate_api_base(api_base: &str) -> Result<()> {
    let trimmed = api_base.trim();
    if trimmed.is_empty() {
        bail!("api base cannot be empty");
    }
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        bail!("api base must start with http:// or https://, got {trimmed}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_config_file_is_none() {
        let td = tempdir().expect("tempdir");
        let config = BoxpubConfig::load_from_dir(td.path()).expect("load");
        assert!(config.is_none());
    }

    #[test]
    fn parses_full_config() {
        let td = tempdir().expect("tempdir");
        fs::write(
            td.path().join(CONFIG_FILE),
            r#"
check_auth = true

[registry]
api_base = "https://boxes.example/api/v1"
owner = "acme"

[box]
provider = "libvirt"
artifact = "build/acme.box"
private = true
short_description = "Acme base image"
description = "Nightly build"

[credential]
token_file = "/etc/boxpub/token"

[upload]
policy = "fail-fast"

[http]
timeout = "90s"
"#,
        )
        .expect("write");

        let config = BoxpubConfig::load_from_dir(td.path())
            .expect("load")
            .expect("present");
        config.validate().expect("valid");

        let opts = config.build_options(&CliOverrides::default());
        assert_eq!(opts.api_base, "https://boxes.example/api/v1");
        assert_eq!(opts.owner, "acme");
        assert_eq!(opts.provider, "libvirt");
        assert_eq!(opts.artifact_path, td.path().join("build/acme.box"));
        assert!(opts.private);
        assert_eq!(opts.short_description.as_deref(), Some("Acme base image"));
        assert_eq!(opts.description.as_deref(), Some("Nightly build"));
        assert_eq!(opts.upload_policy, UploadPolicy::FailFast);
        assert_eq!(opts.timeout, Some(Duration::from_secs(90)));
        assert!(opts.check_auth);
        assert_eq!(
            config.token_file(&CliOverrides::default()),
            Some(PathBuf::from("/etc/boxpub/token"))
        );
    }

    #[test]
    fn empty_config_yields_defaults() {
        let config: BoxpubConfig = toml::from_str("").expect("parse");
        config.validate().expect("valid");
        assert_eq!(
            config.build_options(&CliOverrides::default()),
            PublishOptions::default()
        );
        assert!(config.token_file(&CliOverrides::default()).is_none());
    }

    #[test]
    fn cli_overrides_win_over_config() {
        let config: BoxpubConfig = toml::from_str(
            r#"
[registry]
api_base = "https://boxes.example/api/v1"
owner = "acme"

[upload]
policy = "fail-fast"

[credential]
token_file = "from-config"
"#,
        )
        .expect("parse");

        let cli = CliOverrides {
            api_base: Some("http://127.0.0.1:8080".to_string()),
            upload_policy: Some(UploadPolicy::Tolerant),
            token_file: Some(PathBuf::from("from-cli")),
            timeout: Some(Duration::from_secs(5)),
            ..CliOverrides::default()
        };
        let opts = config.build_options(&cli);
        assert_eq!(opts.api_base, "http://127.0.0.1:8080");
        assert_eq!(opts.owner, "acme");
        assert_eq!(opts.upload_policy, UploadPolicy::Tolerant);
        assert_eq!(opts.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.token_file(&cli), Some(PathBuf::from("from-cli")));
    }

    #[test]
    fn relative_config_paths_resolve_against_config_dir() {
        let td = tempdir().expect("tempdir");
        let nested = td.path().join("ci");
        fs::create_dir_all(&nested).expect("mkdir");
        let path = nested.join("publish.toml");
        fs::write(
            &path,
            "[box]\nartifact = \"out/package.box\"\n\n[credential]\ntoken_file = \"secrets/token\"\n",
        )
        .expect("write");

        let config = BoxpubConfig::load_from_file(&path).expect("load");
        let cli = CliOverrides::default();
        assert_eq!(config.token_file(&cli), Some(nested.join("secrets/token")));
        assert_eq!(
            config.build_options(&cli).artifact_path,
            nested.join("out/package.box")
        );

        let cli = CliOverrides {
            token_file: Some(PathBuf::from("local-token")),
            artifact: Some(PathBuf::from("local.box")),
            ..CliOverrides::default()
        };
        assert_eq!(config.token_file(&cli), Some(PathBuf::from("local-token")));
        assert_eq!(
            config.build_options(&cli).artifact_path,
            PathBuf::from("local.box")
        );
    }

    #[test]
    fn absolute_config_paths_are_kept() {
        let td = tempdir().expect("tempdir");
        let token = td.path().join("abs-token");
        let path = td.path().join("publish.toml");
        fs::write(
            &path,
            format!("[credential]\ntoken_file = {:?}\n", token.display().to_string()),
        )
        .expect("write");

        let config = BoxpubConfig::load_from_file(&path).expect("load");
        assert_eq!(config.token_file(&CliOverrides::default()), Some(token));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config: BoxpubConfig = toml::from_str(
            r#"
[registry]
api_base = "ftp://boxes.example"
"#,
        )
        .expect("parse");
        let err = config.validate().expect_err("must fail");
        assert!(format!("{err:#}").contains("http:// or https://"));

        let config: BoxpubConfig = toml::from_str(
            r#"
[registry]
owner = " "
"#,
        )
        .expect("parse");
        assert!(config.validate().is_err());

        let config: BoxpubConfig = toml::from_str(
            r#"
[http]
timeout = "0s"
"#,
        )
        .expect("parse");
        let err = config.validate().expect_err("must fail");
        assert!(err.to_string().contains("http.timeout"));
    }

    #[test]
    fn unknown_policy_fails_to_parse() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("custom.toml");
        fs::write(&path, "[upload]\npolicy = \"sometimes\"\n").expect("write");

        let err = BoxpubConfig::load_from_file(&path).expect_err("must fail");
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn unreadable_config_reports_path() {
        let td = tempdir().expect("tempdir");
        let err = BoxpubConfig::load_from_file(&td.path().join("nope.toml")).expect_err("must fail");
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
