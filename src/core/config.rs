//! Workflow configuration from YAML

use crate::core::trigger::{ConcurrencyKey, Trigger, TriggerKind};
use crate::core::Run;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name, part of the concurrency key
    pub name: String,

    /// Events that start a run
    #[serde(rename = "on")]
    pub triggers: TriggerConfig,

    /// Concurrency group settings
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Where the site sources come from
    pub source: SourceConfig,

    /// External static-site generator
    pub generator: GeneratorConfig,

    /// Publish target
    pub publish: PublishConfig,

    /// Root for per-run working directories (defaults to the user cache dir)
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,

    /// Optional ceiling for a single stage, in seconds
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
}

/// Trigger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub push: Option<PushTriggerConfig>,

    #[serde(default)]
    pub manual: Option<ManualTriggerConfig>,
}

/// Push trigger: runs on pushes to the designated branches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTriggerConfig {
    pub branches: Vec<String>,
}

/// Manual trigger with its two inputs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualTriggerConfig {
    #[serde(default)]
    pub inputs: ManualInputsConfig,
}

/// Declared manual inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualInputsConfig {
    #[serde(default = "default_log_level_input")]
    pub log_level: InputConfig,

    #[serde(default = "default_tags_input")]
    pub tags: InputConfig,
}

impl Default for ManualInputsConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level_input(),
            tags: default_tags_input(),
        }
    }
}

/// One manual input declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub default: String,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_log_level_input() -> InputConfig {
    InputConfig {
        default: "warning".to_string(),
        description: Some("Log level".to_string()),
    }
}

fn default_tags_input() -> InputConfig {
    InputConfig {
        default: String::new(),
        description: Some("Test scenario tags".to_string()),
    }
}

/// Concurrency group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Group template; `{workflow}` and `{ref}` are substituted
    #[serde(default = "default_group")]
    pub group: String,

    /// Cancel the active run of the group when a new one starts
    #[serde(default = "default_true")]
    pub cancel_in_progress: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            cancel_in_progress: true,
        }
    }
}

fn default_group() -> String {
    "{workflow}-{ref}".to_string()
}

fn default_true() -> bool {
    true
}

/// Source repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Clone URL or local path
    pub repository: String,

    /// Submodule handling
    #[serde(default)]
    pub submodules: SubmoduleMode,

    /// History depth, 0 for the full history
    #[serde(default)]
    pub fetch_depth: u32,
}

/// How submodules are fetched during checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "SubmoduleSetting", into = "SubmoduleSetting")]
pub enum SubmoduleMode {
    /// Initialize submodules and their nested submodules
    #[default]
    Recursive,
    /// Initialize only top-level submodules
    TopLevel,
    /// Do not touch submodules
    Disabled,
}

/// YAML spelling of [`SubmoduleMode`]: `recursive`, `true` or `false`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SubmoduleSetting {
    Flag(bool),
    Named(String),
}

impl TryFrom<SubmoduleSetting> for SubmoduleMode {
    type Error = String;

    fn try_from(value: SubmoduleSetting) -> Result<Self, Self::Error> {
        match value {
            SubmoduleSetting::Flag(true) => Ok(SubmoduleMode::TopLevel),
            SubmoduleSetting::Flag(false) => Ok(SubmoduleMode::Disabled),
            SubmoduleSetting::Named(name) => match name.as_str() {
                "recursive" => Ok(SubmoduleMode::Recursive),
                "true" => Ok(SubmoduleMode::TopLevel),
                "false" => Ok(SubmoduleMode::Disabled),
                other => Err(format!(
                    "invalid submodules value '{}', expected recursive, true or false",
                    other
                )),
            },
        }
    }
}

impl From<SubmoduleMode> for SubmoduleSetting {
    fn from(mode: SubmoduleMode) -> Self {
        match mode {
            SubmoduleMode::Recursive => SubmoduleSetting::Named("recursive".to_string()),
            SubmoduleMode::TopLevel => SubmoduleSetting::Flag(true),
            SubmoduleMode::Disabled => SubmoduleSetting::Flag(false),
        }
    }
}

/// External generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Executable to run
    #[serde(default = "default_generator_command")]
    pub command: String,

    /// Pinned version; checked before the build when set
    #[serde(default)]
    pub version: Option<String>,

    /// Require the extended build of the generator
    #[serde(default)]
    pub extended: bool,

    /// Arguments that make the generator print its version
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,

    /// Minify the generated output
    #[serde(default = "default_true")]
    pub minify: bool,

    /// Flag passed when `minify` is on
    #[serde(default = "default_minify_flag")]
    pub minify_flag: String,

    /// Extra arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the generator process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Output directory, relative to the working tree
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_generator_command() -> String {
    "hugo".to_string()
}

fn default_version_args() -> Vec<String> {
    vec!["version".to_string()]
}

fn default_minify_flag() -> String {
    "--minify".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public")
}

impl GeneratorConfig {
    /// Arguments of the build invocation
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        if self.minify && !self.minify_flag.is_empty() {
            args.push(self.minify_flag.clone());
        }
        args.extend(self.args.iter().cloned());
        args
    }

    /// Version string the generator must report, e.g. `0.119.0+extended`
    pub fn expected_version(&self) -> Option<String> {
        self.version.as_ref().map(|v| {
            let v = v.trim_start_matches('v');
            if self.extended {
                format!("{}+extended", v)
            } else {
                v.to_string()
            }
        })
    }

    /// Whether a reported version satisfies the pin
    ///
    /// An extended build satisfies a plain pin; a plain build never
    /// satisfies `extended: true`.
    pub fn accepts_version(&self, found: &str) -> bool {
        let Some(pinned) = &self.version else {
            return true;
        };
        let (number, extended) = match found.strip_suffix("+extended") {
            Some(number) => (number, true),
            None => (found, false),
        };
        number == pinned.trim_start_matches('v') && (extended || !self.extended)
    }
}

/// Publish target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// `owner/name` on GitHub, a clone URL, or a local path
    pub repository: String,

    /// Branch that serves the site
    #[serde(default = "default_publish_branch")]
    pub branch: String,

    /// Keep files in the target branch that the build did not produce
    #[serde(default = "default_true")]
    pub keep_files: bool,

    /// Environment variable holding the deploy credential
    #[serde(default)]
    pub token_env: Option<String>,

    /// Commit message template; `{sha}`, `{ref}` and `{workflow}` are substituted
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    #[serde(default = "default_user_name")]
    pub user_name: String,

    #[serde(default = "default_user_email")]
    pub user_email: String,

    /// Custom domain written to `CNAME`
    #[serde(default)]
    pub cname: Option<String>,

    /// Write an empty `.nojekyll` file
    #[serde(default)]
    pub nojekyll: bool,

    /// Top-level names in the output that are never published
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_publish_branch() -> String {
    "gh-pages".to_string()
}

fn default_commit_message() -> String {
    "deploy: {sha}".to_string()
}

fn default_user_name() -> String {
    "sitepipe[bot]".to_string()
}

fn default_user_email() -> String {
    "sitepipe[bot]@users.noreply.github.com".to_string()
}

fn default_exclude() -> Vec<String> {
    vec![".github".to_string()]
}

impl SourceConfig {
    /// Clone URL of the source repository
    pub fn clone_url(&self) -> String {
        expand_repository(&self.repository)
    }
}

impl PublishConfig {
    /// Clone URL of the target repository, without credentials
    pub fn remote_url(&self) -> String {
        expand_repository(&self.repository)
    }

    /// Render the commit message for a run
    pub fn render_commit_message(&self, sha: &str, git_ref: &str, workflow: &str) -> String {
        self.commit_message
            .replace("{sha}", sha)
            .replace("{ref}", git_ref)
            .replace("{workflow}", workflow)
    }
}

/// Resolve a repository reference to something `git` can clone
///
/// Existing local paths become absolute, `owner/name` shorthand becomes a
/// GitHub https URL, anything else is used as-is.
pub fn expand_repository(repository: &str) -> String {
    let local = Path::new(repository);
    if local.exists() {
        return local
            .canonicalize()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| repository.to_string());
    }

    let is_shorthand = !repository.contains("://")
        && !repository.contains('@')
        && !repository.starts_with('/')
        && !repository.starts_with('.')
        && !repository.starts_with('~')
        && repository.matches('/').count() == 1;
    if is_shorthand {
        let name = repository.trim_end_matches(".git");
        format!("https://github.com/{}.git", name)
    } else {
        repository.to_string()
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Workflow name must not be empty");
        }

        if self.triggers.push.is_none() && self.triggers.manual.is_none() {
            anyhow::bail!("Workflow '{}' has no triggers", self.name);
        }

        if let Some(push) = &self.triggers.push {
            if push.branches.is_empty() {
                anyhow::bail!("Push trigger must list at least one branch");
            }
            if let Some(branch) = push.branches.iter().find(|b| b.trim().is_empty()) {
                anyhow::bail!("Push trigger has an empty branch name: '{}'", branch);
            }
        }

        if self.concurrency.group.trim().is_empty() {
            anyhow::bail!("Concurrency group must not be empty");
        }

        if self.source.repository.trim().is_empty() {
            anyhow::bail!("Source repository must not be empty");
        }
        if self.source.fetch_depth != 0 {
            warn!(
                "fetch_depth is {}; history-based metadata such as last-modified dates may be wrong",
                self.source.fetch_depth
            );
        }

        if self.generator.command.trim().is_empty() {
            anyhow::bail!("Generator command must not be empty");
        }
        validate_relative_dir(&self.generator.output_dir)?;

        if self.publish.repository.trim().is_empty() {
            anyhow::bail!("Publish repository must not be empty");
        }
        if self.publish.branch.trim().is_empty() {
            anyhow::bail!("Publish branch must not be empty");
        }
        for name in &self.publish.exclude {
            if name.is_empty() || name.contains('/') || name == ".git" {
                anyhow::bail!("Invalid exclude entry '{}': expected a top-level name", name);
            }
        }

        if self.stage_timeout_secs == Some(0) {
            anyhow::bail!("stage_timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// Whether the trigger should start a run of this workflow
    pub fn accepts(&self, trigger: &Trigger) -> bool {
        match trigger.kind() {
            TriggerKind::Push => self
                .triggers
                .push
                .as_ref()
                .is_some_and(|push| push.branches.iter().any(|b| b == trigger.branch())),
            TriggerKind::Manual => self.triggers.manual.is_some(),
        }
    }

    /// Concurrency group the trigger's run belongs to
    pub fn concurrency_key(&self, trigger: &Trigger) -> ConcurrencyKey {
        ConcurrencyKey::render(&self.concurrency.group, &self.name, &trigger.git_ref())
    }

    /// Branch built when no branch is given explicitly
    pub fn default_branch(&self) -> Option<&str> {
        self.triggers
            .push
            .as_ref()
            .and_then(|push| push.branches.first())
            .map(String::as_str)
    }

    /// Manual input declarations, with defaults when none are configured
    pub fn manual_inputs(&self) -> ManualInputsConfig {
        self.triggers
            .manual
            .as_ref()
            .map(|m| m.inputs.clone())
            .unwrap_or_default()
    }

    /// Create a run for the trigger
    pub fn to_run(&self, trigger: Trigger) -> Run {
        Run::new(self, trigger)
    }
}

fn validate_relative_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        anyhow::bail!("Generator output_dir must not be empty");
    }
    for component in dir.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => anyhow::bail!(
                "Generator output_dir '{}' must be a relative path inside the working tree",
                dir.display()
            ),
        }
    }
    if dir.components().all(|c| matches!(c, Component::CurDir)) {
        anyhow::bail!("Generator output_dir must not be the working tree itself");
    }
    Ok(())
}
