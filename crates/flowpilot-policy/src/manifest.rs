use flowpilot_core::normalize::AttributeSchema;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// One persona title entry under `persona_config.persona_titles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaTitle {
    pub title: String,
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    #[serde(default)]
    pub can_be_delegated_to: bool,
    #[serde(default)]
    pub can_be_invited: bool,
}

/// `persona_config`: which persona titles and statuses this domain permits.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersonaConfig {
    #[serde(default)]
    pub persona_titles: Vec<PersonaTitle>,
    #[serde(default)]
    pub persona_statuses: Vec<String>,
}

impl PersonaConfig {
    #[must_use]
    pub fn allowed_titles(&self) -> Vec<&str> {
        self.persona_titles.iter().map(|p| p.title.as_str()).collect()
    }

    #[must_use]
    pub fn title(&self, title: &str) -> Option<&PersonaTitle> {
        self.persona_titles.iter().find(|p| p.title == title)
    }
}

/// A parsed, immutable per-domain manifest: `{name, rule_package,
/// attributes[], persona_config}` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub rule_package: String,
    pub attributes: Vec<AttributeSchema>,
    #[serde(default)]
    pub persona_config: PersonaConfig,
}

impl Manifest {
    /// Actions any persona title in this manifest is allowed to perform.
    #[must_use]
    pub fn allowed_actions(&self) -> std::collections::BTreeSet<String> {
        self.persona_config
            .persona_titles
            .iter()
            .flat_map(|t| t.allowed_actions.iter().cloned())
            .collect()
    }
}

/// Parse one `{dir}/{policy_name}/manifest.yaml` file and validate it
/// against the directory it was found in, per `policy_manifest.py`.
pub fn load_manifest_file(
    policy_name: &str,
    path: &std::path::Path,
) -> Result<Manifest, ManifestError> {
    let raw = std::fs::read_to_string(path)?;
    let manifest: Manifest = serde_yaml::from_str(&raw)?;

    if manifest.name != policy_name {
        return Err(ManifestError::Invalid(
            policy_name.to_string(),
            format!(
                "manifest 'name' field ({}) does not match policy directory ({policy_name})",
                manifest.name
            ),
        ));
    }
    if manifest.attributes.iter().any(|a| a.name.trim().is_empty()) {
        return Err(ManifestError::Invalid(
            policy_name.to_string(),
            "each attribute must declare a non-empty name".to_string(),
        ));
    }
    Ok(manifest)
}
