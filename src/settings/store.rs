use super::error::{SettingsError, SettingsResult};
use crate::detection::{DetectionConfig, TemplateStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";
const TEMPLATES_DIR: &str = "templates";
const APP_DIR: &str = ".spell-trigger";

/// Template record as stored in `config.json`; the image lives next to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(flatten)]
    config: DetectionConfig,
    #[serde(default)]
    templates: Vec<TemplateEntry>,
}

/// `$HOME/.spell-trigger`
pub fn default_settings_dir() -> SettingsResult<PathBuf> {
    homedir::my_home()
        .ok()
        .flatten()
        .map(|home| home.join(APP_DIR))
        .ok_or(SettingsError::NoHomeDirectory)
}

fn check_name(name: &str) -> SettingsResult<()> {
    let bad = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', ':'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(SettingsError::InvalidTemplateName(name.to_string()));
    }
    Ok(())
}

pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at [`default_settings_dir`]
    pub fn open_default() -> SettingsResult<Self> {
        Ok(Self::new(default_settings_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.dir.join(TEMPLATES_DIR)
    }

    pub fn template_path(&self, name: &str) -> PathBuf {
        self.templates_dir().join(format!("{name}.png"))
    }

    pub fn exists(&self) -> bool {
        self.config_path().is_file()
    }

    /// Read config and templates. A missing file yields defaults and an
    /// empty store; a template whose PNG is missing or unreadable is
    /// skipped with a warning.
    pub fn load(&self) -> SettingsResult<(DetectionConfig, TemplateStore)> {
        let path = self.config_path();
        if !path.is_file() {
            log::info!("📄 No settings at {}, using defaults", path.display());
            return Ok((DetectionConfig::default(), TemplateStore::new()));
        }

        let text = fs::read_to_string(&path).map_err(SettingsError::io(&path))?;
        let file: SettingsFile =
            serde_json::from_str(&text).map_err(|source| SettingsError::Json {
                path: path.clone(),
                source,
            })?;

        let mut store = TemplateStore::new();
        for entry in file.templates {
            if let Err(e) = check_name(&entry.name) {
                log::warn!("⚠️ Skipping template: {e}");
                continue;
            }
            let image_path = self.template_path(&entry.name);
            match image::open(&image_path) {
                Ok(image) => {
                    if let Err(e) = store.insert(&entry.name, image, entry.key) {
                        log::warn!("⚠️ Skipping template: {e}");
                    }
                }
                Err(e) => log::warn!(
                    "⚠️ Skipping template '{}': cannot read {}: {e}",
                    entry.name,
                    image_path.display()
                ),
            }
        }

        log::info!(
            "📄 Loaded settings from {} ({} template(s))",
            path.display(),
            store.len()
        );
        Ok((file.config, store))
    }

    /// Write `config.json` and every template PNG, then delete PNGs whose
    /// template is gone.
    pub fn save(&self, config: &DetectionConfig, store: &TemplateStore) -> SettingsResult<()> {
        for template in store.get_all() {
            check_name(&template.name)?;
        }

        let templates_dir = self.templates_dir();
        fs::create_dir_all(&templates_dir).map_err(SettingsError::io(&templates_dir))?;

        for template in store.get_all() {
            let path = self.template_path(&template.name);
            template
                .image
                .save(&path)
                .map_err(|source| SettingsError::Image { path, source })?;
        }

        let file = SettingsFile {
            config: config.clone(),
            templates: store
                .get_all()
                .iter()
                .map(|t| TemplateEntry {
                    name: t.name.clone(),
                    key: t.key.clone(),
                })
                .collect(),
        };
        let path = self.config_path();
        let json = serde_json::to_string_pretty(&file).map_err(|source| SettingsError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(SettingsError::io(&path))?;

        self.remove_stale_images(store)?;
        log::info!("💾 Settings saved to {}", path.display());
        Ok(())
    }

    fn remove_stale_images(&self, store: &TemplateStore) -> SettingsResult<()> {
        let keep: HashSet<PathBuf> = store
            .names()
            .into_iter()
            .map(|name| self.template_path(name))
            .collect();

        let dir = self.templates_dir();
        let entries = fs::read_dir(&dir).map_err(SettingsError::io(&dir))?;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_png = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            if is_png && !keep.contains(&path) {
                fs::remove_file(&path).map_err(SettingsError::io(&path))?;
                log::debug!("🗑️ Removed stale template image {}", path.display());
            }
        }
        Ok(())
    }

    /// Delete the settings file and template images
    pub fn reset(&self) -> SettingsResult<()> {
        let path = self.config_path();
        if path.exists() {
            fs::remove_file(&path).map_err(SettingsError::io(&path))?;
        }
        let dir = self.templates_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(SettingsError::io(&dir))?;
        }
        log::info!("🧹 Settings reset in {}", self.dir.display());
        Ok(())
    }
}
