use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::ManifestError;
use crate::manifest::{load_manifest_file, Manifest};

/// In-memory registry of every manifest found under the configured
/// manifest directory, built once at startup (spec §4.3).
#[derive(Debug, Clone)]
pub struct ManifestRegistry {
    manifests: HashMap<String, Manifest>,
}

impl ManifestRegistry {
    /// Walk `manifest_dir`; each subdirectory containing `manifest.yaml` is
    /// parsed. Rejects the whole registry if zero manifests are valid or if
    /// any present manifest fails schema checks.
    pub fn load(manifest_dir: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let manifest_dir = manifest_dir.as_ref();
        if !manifest_dir.exists() {
            return Err(ManifestError::DirectoryNotFound(
                manifest_dir.display().to_string(),
            ));
        }

        let mut manifests = HashMap::new();
        let mut errors = Vec::new();

        for entry in std::fs::read_dir(manifest_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let policy_name = entry.file_name().to_string_lossy().into_owned();
            let manifest_path = entry.path().join("manifest.yaml");
            if !manifest_path.exists() {
                continue;
            }
            match load_manifest_file(&policy_name, &manifest_path) {
                Ok(manifest) => {
                    manifests.insert(policy_name, manifest);
                }
                Err(err) => errors.push(format!("{policy_name}: {err}")),
            }
        }

        if manifests.is_empty() {
            let detail = if errors.is_empty() {
                "no manifest.yaml files found".to_string()
            } else {
                errors.join("; ")
            };
            return Err(ManifestError::NoManifestsFound(detail));
        }
        if !errors.is_empty() {
            return Err(ManifestError::Invalid(
                manifest_dir.display().to_string(),
                errors.join("; "),
            ));
        }

        tracing::info!(
            count = manifests.len(),
            policies = ?manifests.keys().collect::<Vec<_>>(),
            "loaded policy manifests"
        );
        Ok(Self { manifests })
    }

    fn available(&self) -> String {
        let mut names: Vec<&str> = self.manifests.keys().map(String::as_str).collect();
        names.sort_unstable();
        names.join(", ")
    }

    /// Select a manifest by the request's `policy_hint`. The hint is
    /// required; there is no implicit default (spec §4.3).
    pub fn select(&self, policy_hint: Option<&str>) -> Result<&Manifest, ManifestError> {
        let hint = policy_hint.filter(|h| !h.is_empty());
        let Some(hint) = hint else {
            return Err(ManifestError::MissingPolicyHint);
        };
        self.manifests
            .get(hint)
            .ok_or_else(|| ManifestError::NotFound(hint.to_string(), self.available()))
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Manifest> {
        self.manifests.get(name)
    }

    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        self.manifests.keys().map(String::as_str).collect()
    }

    /// All `allowed_actions` across every loaded manifest (spec §4.3).
    #[must_use]
    pub fn all_actions(&self) -> BTreeSet<String> {
        self.manifests
            .values()
            .flat_map(Manifest::allowed_actions)
            .collect()
    }
}
