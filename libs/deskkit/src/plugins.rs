//! Plugin discovery.
//!
//! Plugin modules are linked into the binary but stay inactive until a manifest file in the
//! base directory enables them. A manifest matches the configured glob pattern
//! (`deskhost.*.plugin.yaml` by default) and looks like:
//!
//! ```yaml
//! module: diagnostics   # defaults to the part of the file name matched by `*`
//! enabled: true         # defaults to true
//! ```

use figment::{
    Figment,
    providers::{Format, Yaml},
};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{
    config::{AppInfo, PluginConfig},
    registry::{ExportModule, ModuleKind},
};

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("invalid plugin pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("cannot read plugin directory entry: {0}")]
    Walk(#[from] glob::GlobError),

    #[error("invalid plugin manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: Box<figment::Error>,
    },

    #[error("cannot derive a module name from {}", path.display())]
    Unnamed { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct ManifestFile {
    module: Option<String>,
    enabled: bool,
}

impl Default for ManifestFile {
    fn default() -> Self {
        Self {
            module: None,
            enabled: true,
        }
    }
}

/// A manifest found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    pub path: PathBuf,
    pub module: String,
    pub enabled: bool,
}

/// Finds plugin manifests in one directory.
#[derive(Debug, Clone)]
pub struct PluginDiscovery {
    base_dir: PathBuf,
    pattern: String,
}

impl PluginDiscovery {
    pub fn new(base_dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            pattern: pattern.into(),
        }
    }

    #[must_use]
    pub fn from_config(info: &AppInfo, config: &PluginConfig) -> Self {
        Self::new(&info.plugin_dir, &config.pattern)
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Manifests matching the pattern, sorted by path.
    ///
    /// # Errors
    /// Returns [`DiscoveryError`] if the pattern is invalid or a manifest cannot be parsed.
    pub fn manifests(&self) -> Result<Vec<PluginManifest>, DiscoveryError> {
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&self.base_dir.to_string_lossy()),
            self.pattern
        );
        let paths = glob::glob(&full).map_err(|source| DiscoveryError::Pattern {
            pattern: self.pattern.clone(),
            source,
        })?;

        let mut manifests = Vec::new();
        for path in paths {
            let path = path?;
            if !path.is_file() {
                continue;
            }
            let file = read_manifest(&path)?;
            let module = match file.module {
                Some(name) => name,
                None => self
                    .name_from_file(&path)
                    .ok_or_else(|| DiscoveryError::Unnamed { path: path.clone() })?,
            };
            manifests.push(PluginManifest {
                path,
                module,
                enabled: file.enabled,
            });
        }
        manifests.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(manifests)
    }

    /// Builtins plus the plugins enabled by a manifest, preserving `linked` order.
    ///
    /// # Errors
    /// Same as [`PluginDiscovery::manifests`].
    pub fn select(
        &self,
        linked: &[&'static ExportModule],
    ) -> Result<Vec<&'static ExportModule>, DiscoveryError> {
        // Later manifests for the same module override earlier ones.
        let mut enabled: BTreeMap<String, bool> = BTreeMap::new();
        for manifest in self.manifests()? {
            if !linked.iter().any(|m| m.name == manifest.module) {
                tracing::warn!(
                    module = %manifest.module,
                    manifest = %manifest.path.display(),
                    "Plugin manifest names a module that is not linked; skipping"
                );
                continue;
            }
            enabled.insert(manifest.module, manifest.enabled);
        }

        let selected: Vec<&'static ExportModule> = linked
            .iter()
            .copied()
            .filter(|m| match m.kind {
                ModuleKind::Builtin => true,
                ModuleKind::Plugin => enabled.get(m.name).copied().unwrap_or(false),
            })
            .collect();

        tracing::info!(
            dir = %self.base_dir.display(),
            pattern = %self.pattern,
            modules = ?selected.iter().map(|m| m.name).collect::<Vec<_>>(),
            "Modules discovered"
        );
        Ok(selected)
    }

    fn name_from_file(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        let (prefix, suffix) = self.pattern.split_once('*')?;
        let name = file_name.strip_prefix(prefix)?.strip_suffix(suffix)?;
        (!name.is_empty()).then(|| name.to_owned())
    }
}

fn read_manifest(path: &Path) -> Result<ManifestFile, DiscoveryError> {
    // An empty manifest enables the module named by its file.
    if std::fs::metadata(path).is_ok_and(|m| m.len() == 0) {
        return Ok(ManifestFile::default());
    }
    Figment::new()
        .merge(Yaml::file(path))
        .extract()
        .map_err(|e| DiscoveryError::Manifest {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
}

/// Where the set of active modules comes from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// Linked modules filtered by plugin manifests.
    Discovered(PluginDiscovery),
    /// An explicit list.
    Fixed(Vec<&'static ExportModule>),
}

impl ModuleSource {
    /// # Errors
    /// Returns [`DiscoveryError`] if discovery fails.
    pub fn load(&self) -> Result<Vec<&'static ExportModule>, DiscoveryError> {
        match self {
            ModuleSource::Discovered(discovery) => discovery.select(&ExportModule::linked()),
            ModuleSource::Fixed(modules) => Ok(modules.clone()),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{config::DEFAULT_PLUGIN_PATTERN, registry::ExportSet};

    fn nothing(_: &mut ExportSet) {}

    static CORE: ExportModule = ExportModule::builtin("core", nothing);
    static REPORTS: ExportModule = ExportModule::plugin("reports", nothing);
    static SCALES: ExportModule = ExportModule::plugin("scales", nothing);

    fn linked() -> Vec<&'static ExportModule> {
        vec![&CORE, &REPORTS, &SCALES]
    }

    fn names(modules: &[&'static ExportModule]) -> Vec<&'static str> {
        modules.iter().map(|m| m.name).collect()
    }

    #[test]
    fn builtins_only_without_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = PluginDiscovery::new(dir.path(), DEFAULT_PLUGIN_PATTERN);
        assert_eq!(names(&discovery.select(&linked()).unwrap()), vec!["core"]);
    }

    #[test]
    fn manifest_enables_plugin_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deskhost.reports.plugin.yaml"), "enabled: true\n").unwrap();
        std::fs::write(dir.path().join("unrelated.yaml"), "module: scales\n").unwrap();

        let discovery = PluginDiscovery::new(dir.path(), DEFAULT_PLUGIN_PATTERN);
        let manifests = discovery.manifests().unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].module, "reports");
        assert_eq!(
            names(&discovery.select(&linked()).unwrap()),
            vec!["core", "reports"]
        );
    }

    #[test]
    fn explicit_module_name_and_disabled_flag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("deskhost.weighing.plugin.yaml"),
            "module: scales\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("deskhost.reports.plugin.yaml"),
            "enabled: false\n",
        )
        .unwrap();

        let discovery = PluginDiscovery::new(dir.path(), DEFAULT_PLUGIN_PATTERN);
        assert_eq!(
            names(&discovery.select(&linked()).unwrap()),
            vec!["core", "scales"]
        );
    }

    #[test]
    fn unknown_module_is_skipped_and_empty_manifest_enables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deskhost.ghost.plugin.yaml"), "").unwrap();
        std::fs::write(dir.path().join("deskhost.scales.plugin.yaml"), "").unwrap();

        let discovery = PluginDiscovery::new(dir.path(), DEFAULT_PLUGIN_PATTERN);
        assert_eq!(
            names(&discovery.select(&linked()).unwrap()),
            vec!["core", "scales"]
        );
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("deskhost.reports.plugin.yaml"),
            "enabled: [not, a, bool]\n",
        )
        .unwrap();

        let discovery = PluginDiscovery::new(dir.path(), DEFAULT_PLUGIN_PATTERN);
        assert!(matches!(
            discovery.manifests(),
            Err(DiscoveryError::Manifest { .. })
        ));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = PluginDiscovery::new(dir.path(), "deskhost.[.yaml");
        assert!(matches!(
            discovery.manifests(),
            Err(DiscoveryError::Pattern { .. })
        ));
    }

    #[test]
    fn fixed_source_is_returned_verbatim() {
        let source = ModuleSource::Fixed(vec![&SCALES, &CORE]);
        assert_eq!(names(&source.load().unwrap()), vec!["scales", "core"]);
    }
}
