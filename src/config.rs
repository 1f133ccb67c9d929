// Engine configuration - defaults, optional file, environment overrides

//! # Engine Configuration
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults ([`EngineConfig::default`])
//! 2. An optional config file (TOML, YAML or JSON, picked by extension)
//! 3. Environment variables prefixed with `WORKFLOW_ENGINE__`, e.g.
//!    `WORKFLOW_ENGINE__TRIGGER_ACTIONS_ENABLED=false`
//!
//! List values from the environment are comma separated:
//! `WORKFLOW_ENGINE__DRY_RUN_ORGANIZATIONS=3,7`.

use serde::{Deserialize, Serialize};

use crate::models::OrganizationId;
use crate::Result;

pub const ENV_PREFIX: &str = "WORKFLOW_ENGINE";
pub const DEFAULT_BUFFER_LIST_KEY: &str = "workflow_engine_delayed_processing_buffer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Debounce window for workflows without a configured frequency
    pub default_frequency_minutes: i64,

    /// Global kill switch for action dispatch. When off, fires are still
    /// recorded in the fire history.
    pub trigger_actions_enabled: bool,

    /// Organizations whose fires are recorded but never dispatched
    pub dry_run_organizations: Vec<OrganizationId>,

    /// Sorted set that lists projects with buffered work
    pub buffer_list_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_frequency_minutes: 30,
            trigger_actions_enabled: true,
            dry_run_organizations: Vec::new(),
            buffer_list_key: DEFAULT_BUFFER_LIST_KEY.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("dry_run_organizations")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Whether actions for `organization_id` are dispatched or only recorded
    pub fn actions_permitted(&self, organization_id: OrganizationId) -> bool {
        self.trigger_actions_enabled && !self.dry_run_organizations.contains(&organization_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_frequency_minutes, 30);
        assert!(config.trigger_actions_enabled);
        assert_eq!(config.buffer_list_key, "workflow_engine_delayed_processing_buffer");
    }

    #[test]
    fn test_actions_permitted() {
        let mut config = EngineConfig {
            dry_run_organizations: vec![OrganizationId(3)],
            ..EngineConfig::default()
        };
        assert!(config.actions_permitted(OrganizationId(1)));
        assert!(!config.actions_permitted(OrganizationId(3)));

        config.trigger_actions_enabled = false;
        assert!(!config.actions_permitted(OrganizationId(1)));
    }

    #[test]
    fn test_load_from_file_keeps_unset_defaults() {
        let path = std::env::temp_dir().join(format!("workflow-engine-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "default_frequency_minutes = 5").unwrap();
        writeln!(file, "dry_run_organizations = [4]").unwrap();

        let config = EngineConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.default_frequency_minutes, 5);
        assert_eq!(config.dry_run_organizations, vec![OrganizationId(4)]);
        assert!(config.trigger_actions_enabled);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load(Some("/nonexistent/workflow-engine")).unwrap();
        assert_eq!(config.default_frequency_minutes, 30);
    }
}
