use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Fallback prompt template used when a custom style ships without one.
pub fn base_prompt(material_name: &str) -> String {
    format!(
        "Transform this sketch into a {} material. Render it in a high-end 3D \
         visualization style with professional studio lighting against a pure black \
         background. Make it look like an elegant Cinema 4D and Octane rendering \
         with detailed material properties and characteristics. The final result \
         should be an elegant visualization with perfect studio lighting, crisp \
         shadows, and high-end material definition.",
        material_name.to_lowercase()
    )
}

/// A render style: a named prompt template the generation request is built
/// from.  Built-in styles ship with the app; custom styles are user-created
/// and persisted to disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StyleDefinition {
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub is_custom: bool,
}

/// Change notifications emitted by the [`StyleStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StyleEvent {
    Added(String),
    Removed(String),
    Selected(String),
}

type StyleListener = Box<dyn Fn(&StyleEvent)>;

/// Central registry of render styles.
///
/// Keys are stable identifiers: built-ins use fixed names, custom styles get
/// a `<slug>_<millis>` key at creation so renames never collide.  Interested
/// components subscribe for change events instead of polling.
pub struct StyleStore {
    styles: BTreeMap<String, StyleDefinition>,
    selected: String,
    listeners: Vec<StyleListener>,
}

impl Default for StyleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleStore {
    pub fn new() -> Self {
        let mut styles = BTreeMap::new();
        for (key, def) in builtin_styles() {
            styles.insert(key.to_string(), def);
        }
        Self {
            styles,
            selected: "material".to_string(),
            listeners: Vec::new(),
        }
    }

    /// Register a change listener.  Listeners live as long as the store.
    pub fn subscribe(&mut self, listener: impl Fn(&StyleEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&self, event: StyleEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    /// Keys in stable (sorted) order, for menu rendering.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&StyleDefinition> {
        self.styles.get(key)
    }

    pub fn selected_key(&self) -> &str {
        &self.selected
    }

    pub fn selected_name(&self) -> &str {
        self.styles
            .get(&self.selected)
            .map(|s| s.name.as_str())
            .unwrap_or(&self.selected)
    }

    /// Select a style by key.  Unknown keys are logged and ignored so a
    /// stale persisted selection can't leave the store in a bad state.
    pub fn select(&mut self, key: &str) {
        if !self.styles.contains_key(key) {
            crate::log_warn!("styles: ignoring selection of unknown style '{}'", key);
            return;
        }
        if self.selected != key {
            self.selected = key.to_string();
            self.notify(StyleEvent::Selected(key.to_string()));
        }
    }

    /// Prompt for a style key, falling back to the default "material" prompt
    /// when the key is unknown.
    pub fn prompt_for(&self, key: &str) -> String {
        self.styles
            .get(key)
            .or_else(|| self.styles.get("material"))
            .map(|s| s.prompt.clone())
            .unwrap_or_else(|| base_prompt("chrome"))
    }

    /// Add a custom style under a freshly generated `<slug>_<millis>` key
    /// and return the key.  An empty prompt falls back to the name-derived
    /// [`base_prompt`]; an empty name is rejected.
    pub fn insert_custom(&mut self, name: &str, prompt: &str) -> Result<String, String> {
        let name = name.trim();
        let prompt = prompt.trim();
        if name.is_empty() {
            return Err("Style name cannot be empty".to_string());
        }
        let prompt = if prompt.is_empty() {
            base_prompt(name)
        } else {
            prompt.to_string()
        };
        let key = custom_key(name);
        self.styles.insert(
            key.clone(),
            StyleDefinition {
                name: name.to_string(),
                prompt,
                is_custom: true,
            },
        );
        self.notify(StyleEvent::Added(key.clone()));
        Ok(key)
    }

    /// Remove a custom style.  Built-in styles cannot be removed.  If the
    /// removed style was selected, selection falls back to "material".
    pub fn remove(&mut self, key: &str) -> Result<(), String> {
        match self.styles.get(key) {
            None => return Err(format!("Unknown style '{}'", key)),
            Some(def) if !def.is_custom => {
                return Err(format!("Cannot remove built-in style '{}'", def.name));
            }
            Some(_) => {}
        }
        self.styles.remove(key);
        if self.selected == key {
            self.selected = "material".to_string();
            self.notify(StyleEvent::Selected(self.selected.clone()));
        }
        self.notify(StyleEvent::Removed(key.to_string()));
        Ok(())
    }

    /// The custom subset, for persistence.
    pub fn custom_styles(&self) -> BTreeMap<String, StyleDefinition> {
        self.styles
            .iter()
            .filter(|(_, def)| def.is_custom)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Merge previously persisted custom styles back in.  Existing keys are
    /// overwritten; built-ins are never touched.
    pub fn load_custom(&mut self, saved: BTreeMap<String, StyleDefinition>) {
        for (key, mut def) in saved {
            if self.styles.get(&key).is_some_and(|s| !s.is_custom) {
                crate::log_warn!("styles: saved style '{}' collides with a built-in, skipped", key);
                continue;
            }
            def.is_custom = true;
            self.styles.insert(key, def);
        }
    }
}

/// `<slug>_<millis>` key for a new custom style.  Whitespace runs in the
/// lowercased name collapse to single underscores.
fn custom_key(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}_{}", slug, millis)
}

fn builtin_styles() -> Vec<(&'static str, StyleDefinition)> {
    vec![
        (
            "material",
            StyleDefinition {
                name: "Chrome".to_string(),
                prompt: "Recreate this doodle as a physical, floating chrome sculpture \
                         made of a chromium metal tubes or pipes in a professional studio \
                         setting. If it is typography, render it accordingly, but always \
                         always have a black background and studio lighting. Render it \
                         using Cinema 4D with Octane, using studio lighting against a pure \
                         black background. Make it look like a high-end elegant rendering \
                         of a sculptural piece. Flat Black background always"
                    .to_string(),
                is_custom: false,
            },
        ),
        (
            "honey",
            StyleDefinition {
                name: "Honey".to_string(),
                prompt: "Transform this sketch into a honey. Render it as if made entirely \
                         of translucent, golden honey with characteristic viscous drips and \
                         flows. Add realistic liquid properties including surface tension, \
                         reflections, and light refraction. Render it in Cinema 4D with \
                         Octane, using studio lighting against a pure black background. \
                         Flat Black background always"
                    .to_string(),
                is_custom: false,
            },
        ),
        (
            "softbody",
            StyleDefinition {
                name: "Soft Body".to_string(),
                prompt: "Convert this drawing / text into a soft body physics render. \
                         Render it as if made of a soft, jelly-like material that responds \
                         to gravity and motion. Add realistic deformation, bounce, and \
                         squash effects typical of soft body dynamics. Use dramatic \
                         lighting against a black background to emphasize the material's \
                         translucency and surface properties. Render it in Cinema 4D with \
                         Octane, using studio lighting against a pure black background. \
                         Make it look like a high-end 3D animation frame."
                    .to_string(),
                is_custom: false,
            },
        ),
        (
            "testMaterial",
            StyleDefinition {
                name: "Surprise Me!".to_string(),
                prompt: "Transform this sketch into an experimental material with unique \
                         and unexpected properties. Each generation should be different \
                         and surprising - it could be crystalline, liquid, gaseous, \
                         organic, metallic, or something completely unexpected. Use \
                         dramatic studio lighting against a pure black background to \
                         showcase the material's unique characteristics. Render it in a \
                         high-end 3D style with professional lighting and composition, \
                         emphasizing the most interesting and unexpected qualities of the \
                         chosen material."
                    .to_string(),
                is_custom: false,
            },
        ),
    ]
}
