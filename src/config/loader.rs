//! Configuration loading with multi-layer merge

use super::builtin;
use super::{AgentConfig, WorkflowConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Directory name for project-level configuration
pub const PROJECT_DIR: &str = ".flowgate";

/// Top-level flowgate configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowgateConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Approval registry settings
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Step-executing agents
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Capacity of the bounded per-request event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

fn default_event_buffer() -> usize {
    64
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Approval registry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySettings {
    /// Evict suspended runs idle longer than this (disabled when unset)
    pub idle_timeout_secs: Option<u64>,

    /// How often the sweeper checks for idle runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl FlowgateConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/flowgate/config.toml
    /// 3. .flowgate/config.toml (project)
    /// 4. Explicit file passed with --config
    pub fn load(project_dir: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_root(project_dir).join("config.toml");
        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        if let Some(path) = explicit {
            let explicit_config =
                Self::load_file(path).with_context(|| format!("loading {}", path.display()))?;
            config.merge(explicit_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/flowgate/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("flowgate/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.server.host != default_host() {
            self.server.host = other.server.host;
        }
        if other.server.port != default_port() {
            self.server.port = other.server.port;
        }
        if other.server.event_buffer != default_event_buffer() {
            self.server.event_buffer = other.server.event_buffer;
        }

        if other.registry.idle_timeout_secs.is_some() {
            self.registry.idle_timeout_secs = other.registry.idle_timeout_secs;
        }
        if other.registry.sweep_interval_secs != default_sweep_interval() {
            self.registry.sweep_interval_secs = other.registry.sweep_interval_secs;
        }

        // Agents: other wins for same key
        for (name, agent) in other.agents {
            self.agents.insert(name, agent);
        }
    }
}

fn project_root(project_dir: Option<&Path>) -> PathBuf {
    project_dir
        .map(|p| p.join(PROJECT_DIR))
        .unwrap_or_else(|| PathBuf::from(PROJECT_DIR))
}

fn user_workflow_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("flowgate/workflows"))
}

/// Where a workflow definition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowSource {
    Project,
    User,
    Builtin,
}

/// Load a workflow from the standard hierarchy
///
/// Search order (first match wins):
/// 1. .flowgate/workflows/{name}.toml (project)
/// 2. ~/.config/flowgate/workflows/{name}.toml (user)
/// 3. Built-in workflows (embedded)
pub fn load_workflow(name: &str, project_dir: Option<&Path>) -> Result<WorkflowConfig> {
    let filename = format!("{}.toml", name);

    let project_path = project_root(project_dir).join("workflows").join(&filename);
    if project_path.exists() {
        return load_workflow_file(&project_path);
    }

    if let Some(user_dir) = user_workflow_dir() {
        let user_path = user_dir.join(&filename);
        if user_path.exists() {
            return load_workflow_file(&user_path);
        }
    }

    if let Some(source) = builtin::get(name) {
        return parse_workflow(source, &format!("built-in workflow '{}'", name));
    }

    anyhow::bail!("workflow '{}' not found", name)
}

/// Load every visible workflow, keyed by name
///
/// Project definitions shadow user definitions, which shadow built-ins.
pub fn load_all_workflows(
    project_dir: Option<&Path>,
) -> Result<BTreeMap<String, (WorkflowConfig, WorkflowSource)>> {
    let mut workflows = BTreeMap::new();

    for (name, source) in builtin::all() {
        let workflow = parse_workflow(source, &format!("built-in workflow '{}'", name))?;
        workflows.insert(name.to_string(), (workflow, WorkflowSource::Builtin));
    }

    if let Some(user_dir) = user_workflow_dir() {
        load_workflow_dir(&user_dir, WorkflowSource::User, &mut workflows)?;
    }

    let project_dir = project_root(project_dir).join("workflows");
    load_workflow_dir(&project_dir, WorkflowSource::Project, &mut workflows)?;

    Ok(workflows)
}

fn load_workflow_dir(
    dir: &Path,
    source: WorkflowSource,
    workflows: &mut BTreeMap<String, (WorkflowConfig, WorkflowSource)>,
) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let workflow = load_workflow_file(&path)?;
        if workflow.name != stem {
            anyhow::bail!(
                "{} declares name '{}' but is stored as '{}'",
                path.display(),
                workflow.name,
                stem
            );
        }
        tracing::debug!(workflow = stem, ?source, path = %path.display(), "Loaded workflow");
        workflows.insert(stem.to_string(), (workflow, source));
    }

    Ok(())
}

fn load_workflow_file(path: &Path) -> Result<WorkflowConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_workflow(&contents, &path.display().to_string())
}

fn parse_workflow(contents: &str, origin: &str) -> Result<WorkflowConfig> {
    let workflow: WorkflowConfig =
        toml::from_str(contents).with_context(|| format!("parsing {}", origin))?;

    workflow.validate().map_err(|errors| {
        anyhow::anyhow!(
            "{}: workflow validation failed:\n  {}",
            origin,
            errors.join("\n  ")
        )
    })?;

    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_empty_config() {
        let config = FlowgateConfig::default();
        assert!(config.agents.is_empty());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.event_buffer, 64);
        assert!(config.registry.idle_timeout_secs.is_none());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
            [server]
            port = 9090

            [registry]
            idle_timeout_secs = 3600

            [agents.inventory]
            url = "http://localhost:7000/inventory"

            [agents.warehouse]
            output = {{ slot = "B-12" }}
        "#
        )
        .unwrap();

        let config = FlowgateConfig::load_file(&config_path).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.registry.idle_timeout_secs, Some(3600));
        assert!(config.agents.contains_key("inventory"));
        assert!(config.agents["warehouse"].output.is_some());
    }

    #[test]
    fn test_config_merge() {
        let mut base = FlowgateConfig::default();
        base.agents.insert(
            "inventory".into(),
            AgentConfig {
                url: Some("http://old".into()),
                timeout: 30,
                ..Default::default()
            },
        );

        let mut override_config = FlowgateConfig::default();
        override_config.server.port = 3000;
        override_config.agents.insert(
            "inventory".into(),
            AgentConfig {
                url: Some("http://new".into()),
                timeout: 10,
                ..Default::default()
            },
        );
        override_config
            .agents
            .insert("shipping".into(), AgentConfig::default());

        base.merge(override_config);

        assert_eq!(base.server.port, 3000);
        assert_eq!(base.agents["inventory"].url.as_deref(), Some("http://new"));
        assert_eq!(base.agents["inventory"].timeout, 10);
        assert!(base.agents.contains_key("shipping"));
    }

    #[test]
    fn test_explicit_config_wins() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join(PROJECT_DIR);
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("config.toml"), "[server]\nport = 4000\n").unwrap();

        let explicit = dir.path().join("override.toml");
        std::fs::write(&explicit, "[server]\nport = 5000\n").unwrap();

        let config = FlowgateConfig::load(Some(dir.path()), None).unwrap();
        assert_eq!(config.server.port, 4000);

        let config = FlowgateConfig::load(Some(dir.path()), Some(&explicit)).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_load_builtin_workflow() {
        let dir = TempDir::new().unwrap();
        let workflow = load_workflow("order_fulfillment", Some(dir.path())).unwrap();
        assert_eq!(workflow.name, "order_fulfillment");
        assert_eq!(workflow.steps.len(), 5);
    }

    #[test]
    fn test_project_workflow_shadows_builtin() {
        let dir = TempDir::new().unwrap();
        let workflows = dir.path().join(PROJECT_DIR).join("workflows");
        std::fs::create_dir_all(&workflows).unwrap();
        std::fs::write(
            workflows.join("order_fulfillment.toml"),
            r#"
            name = "order_fulfillment"
            description = "Trimmed down"

            [[steps]]
            id = "intake"
            label = "Order Intake"
            "#,
        )
        .unwrap();

        let workflow = load_workflow("order_fulfillment", Some(dir.path())).unwrap();
        assert_eq!(workflow.steps.len(), 1);

        let all = load_all_workflows(Some(dir.path())).unwrap();
        let (shadowed, source) = &all["order_fulfillment"];
        assert_eq!(shadowed.description, "Trimmed down");
        assert_eq!(*source, WorkflowSource::Project);
        assert!(all.contains_key("expense_claim"));
    }

    #[test]
    fn test_invalid_workflow_reports_errors() {
        let dir = TempDir::new().unwrap();
        let workflows = dir.path().join(PROJECT_DIR).join("workflows");
        std::fs::create_dir_all(&workflows).unwrap();
        std::fs::write(
            workflows.join("broken.toml"),
            r#"
            name = "broken"

            [[steps]]
            id = "a"
            label = "A"

            [[steps]]
            id = "a"
            label = "Again"
            "#,
        )
        .unwrap();

        let err = load_workflow("broken", Some(dir.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("duplicate step id"));
    }

    #[test]
    fn test_missing_workflow() {
        let dir = TempDir::new().unwrap();
        let err = load_workflow("does_not_exist", Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
