use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::components::styles::StyleDefinition;

/// Default render service endpoint.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

// ============================================================================
// OUTPUT DIMENSIONS
// ============================================================================

/// An output dimension preset offered in the toolbar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimension {
    pub id: &'static str,
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

pub const DIMENSION_PRESETS: &[Dimension] = &[
    Dimension {
        id: "landscape",
        label: "Landscape (3:2)",
        width: 1500,
        height: 1000,
    },
    Dimension {
        id: "square",
        label: "Square (1:1)",
        width: 1000,
        height: 1000,
    },
    Dimension {
        id: "portrait",
        label: "Portrait (4:5)",
        width: 1000,
        height: 1250,
    },
];

/// Look up a preset by id, falling back to the first (landscape).
pub fn dimension_by_id(id: &str) -> Dimension {
    DIMENSION_PRESETS
        .iter()
        .copied()
        .find(|d| d.id == id)
        .unwrap_or(DIMENSION_PRESETS[0])
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Persisted application settings, stored as a flat key=value file in the
/// platform config directory.
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Base URL of the render service.
    pub api_base_url: String,
    /// User-supplied API key sent with requests when the shared quota runs out.
    pub api_key_override: String,
    /// Re-render automatically after each completed edit.
    pub auto_generate: bool,
    /// Maximum number of undo snapshots kept.
    pub max_undo_steps: usize,
    /// Verbose request/response logging.
    pub debug_mode: bool,
    /// Last selected style key.
    pub style_key: String,
    /// Last selected output dimension preset id.
    pub dimension_id: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key_override: String::new(),
            auto_generate: true,
            max_undo_steps: 50,
            debug_mode: false,
            style_key: "material".to_string(),
            dimension_id: "landscape".to_string(),
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/sketchfe/sketchfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\SketchFE\sketchfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/SketchFE/sketchfe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub(crate) fn settings_path() -> Option<PathBuf> {
        Some(config_dir()?.join("sketchfe_settings.cfg"))
    }

    /// Save settings to disk.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        let content = format!(
            "api_base_url={}\n\
             api_key_override={}\n\
             auto_generate={}\n\
             max_undo_steps={}\n\
             debug_mode={}\n\
             style_key={}\n\
             dimension_id={}\n",
            self.api_base_url,
            self.api_key_override,
            self.auto_generate,
            self.max_undo_steps,
            self.debug_mode,
            self.style_key,
            self.dimension_id,
        );
        if let Err(e) = std::fs::write(&path, content) {
            crate::log_warn!("settings: failed to write {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "api_base_url" => {
                    if !val.is_empty() {
                        s.api_base_url = val.to_string();
                    }
                }
                "api_key_override" => {
                    s.api_key_override = val.to_string();
                }
                "auto_generate" => {
                    s.auto_generate = val == "true";
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(50);
                }
                "debug_mode" => {
                    s.debug_mode = val == "true";
                }
                "style_key" => {
                    s.style_key = val.to_string();
                }
                "dimension_id" => {
                    s.dimension_id = val.to_string();
                }
                _ => {}
            }
        }
        s
    }

    /// The key override as an `Option`, empty meaning unset.
    pub fn api_key(&self) -> Option<String> {
        let trimmed = self.api_key_override.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

// ============================================================================
// CUSTOM STYLE PERSISTENCE
// ============================================================================

fn custom_styles_path() -> Option<PathBuf> {
    Some(config_dir()?.join("custom_styles.json"))
}

/// Write the user's custom styles as JSON next to the settings file.
pub fn save_custom_styles(styles: &BTreeMap<String, StyleDefinition>) {
    let Some(path) = custom_styles_path() else { return };
    let json = match serde_json::to_string_pretty(styles) {
        Ok(json) => json,
        Err(e) => {
            crate::log_err!("styles: failed to serialize custom styles: {}", e);
            return;
        }
    };
    if let Err(e) = std::fs::write(&path, json) {
        crate::log_warn!("styles: failed to write {}: {}", path.display(), e);
    }
}

/// Load previously saved custom styles.  Missing or corrupt files yield an
/// empty map.
pub fn load_custom_styles() -> BTreeMap<String, StyleDefinition> {
    let Some(path) = custom_styles_path() else {
        return BTreeMap::new();
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return BTreeMap::new();
    };
    match serde_json::from_str(&content) {
        Ok(styles) => styles,
        Err(e) => {
            crate::log_warn!("styles: failed to parse {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

/// Platform config directory with the app sub-folder, created on demand.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                PathBuf::from(home).join(".config")
            })
            .join("sketchfe");
        let _ = std::fs::create_dir_all(&config_dir);
        Some(config_dir)
    }
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                    .unwrap_or_default()
            });
        let config_dir = PathBuf::from(appdata).join("SketchFE");
        let _ = std::fs::create_dir_all(&config_dir);
        Some(config_dir)
    }
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
        let config_dir = PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("SketchFE");
        let _ = std::fs::create_dir_all(&config_dir);
        Some(config_dir)
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_through_save_format() {
        let mut settings = AppSettings::default();
        settings.api_base_url = "https://render.example.com".to_string();
        settings.api_key_override = "sk-test".to_string();
        settings.auto_generate = false;
        settings.max_undo_steps = 25;
        settings.debug_mode = true;
        settings.style_key = "honey".to_string();
        settings.dimension_id = "portrait".to_string();

        let content = format!(
            "api_base_url={}\napi_key_override={}\nauto_generate={}\nmax_undo_steps={}\n\
             debug_mode={}\nstyle_key={}\ndimension_id={}\n",
            settings.api_base_url,
            settings.api_key_override,
            settings.auto_generate,
            settings.max_undo_steps,
            settings.debug_mode,
            settings.style_key,
            settings.dimension_id,
        );
        assert_eq!(AppSettings::parse(&content), settings);
    }

    #[test]
    fn parse_tolerates_garbage_and_missing_keys() {
        let settings = AppSettings::parse("not a key value line\nmax_undo_steps=banana\n");
        assert_eq!(settings.max_undo_steps, 50);
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn empty_api_key_is_none() {
        let mut settings = AppSettings::default();
        assert_eq!(settings.api_key(), None);
        settings.api_key_override = "  key  ".to_string();
        assert_eq!(settings.api_key(), Some("key".to_string()));
    }

    #[test]
    fn dimension_lookup_falls_back_to_landscape() {
        assert_eq!(dimension_by_id("square").width, 1000);
        assert_eq!(dimension_by_id("portrait").height, 1250);
        assert_eq!(dimension_by_id("bogus").id, "landscape");
    }
}
