//! Persona templates and prompt construction.
//!
//! A persona is a named instruction text prepended to every prompt to
//! bias response tone. Built-in personas can be overridden (or extended)
//! by a flat TOML table at `~/.config/gemchat/personas.toml`; a missing
//! or malformed override file is silently ignored.

use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Rules text appended after the persona instructions in every prompt.
pub const RULES_TEXT: &str = "Additional rules:\n\
- Use bullet points when helpful.\n\
- Provide runnable examples when code is requested.\n\
- Keep answers short unless --long is used.";

/// Suffix appended to a user turn when --long is set.
pub const LONG_SUFFIX: &str = " (be detailed)";

/// The merged persona set, loaded once at startup and immutable after.
#[derive(Debug, Clone)]
pub struct PersonaSet {
    personas: HashMap<String, String>,
}

fn builtin_personas() -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert(
        "default".to_string(),
        "You are a helpful assistant. Answer clearly and directly.".to_string(),
    );
    map.insert(
        "hacker".to_string(),
        "You are a grizzled systems hacker. Answer tersely, favor command-line \
         solutions, and assume the reader is comfortable in a terminal."
            .to_string(),
    );
    map.insert(
        "teacher".to_string(),
        "You are a patient teacher. Explain concepts step by step and check \
         assumptions before diving into detail."
            .to_string(),
    );
    map.insert(
        "pirate".to_string(),
        "You are a pirate. Answer every question in pirate speak, but keep the \
         technical content accurate."
            .to_string(),
    );
    map
}

impl Default for PersonaSet {
    fn default() -> Self {
        Self {
            personas: builtin_personas(),
        }
    }
}

impl PersonaSet {
    /// Load the built-in personas merged with the override file.
    /// Override entries win; file problems fall back to builtins only.
    pub fn load(override_path: &Path) -> Self {
        let mut personas = builtin_personas();

        if let Ok(contents) = std::fs::read_to_string(override_path) {
            match toml::from_str::<HashMap<String, String>>(&contents) {
                Ok(overrides) => {
                    debug!("Loaded {} persona override(s)", overrides.len());
                    personas.extend(overrides);
                }
                Err(e) => {
                    debug!("Ignoring malformed persona file: {}", e);
                }
            }
        }

        Self { personas }
    }

    /// Look up a persona's instruction text, falling back to "default"
    /// on a miss. The default persona always exists.
    pub fn instruction(&self, name: &str) -> &str {
        self.personas
            .get(name)
            .or_else(|| self.personas.get("default"))
            .expect("default persona must exist")
    }

    /// Persona names, sorted, for the `personas` listing.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unknown_persona_falls_back_to_default() {
        let set = PersonaSet::default();
        assert_eq!(set.instruction("no-such-persona"), set.instruction("default"));
    }

    #[test]
    fn test_builtin_personas_present() {
        let set = PersonaSet::default();
        assert!(set.names().contains(&"default"));
        assert!(set.names().contains(&"hacker"));
    }

    #[test]
    fn test_override_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("personas.toml");
        std::fs::write(&path, "hacker = \"Custom hacker text.\"\nnew = \"Brand new.\"\n")
            .unwrap();

        let set = PersonaSet::load(&path);
        assert_eq!(set.instruction("hacker"), "Custom hacker text.");
        assert_eq!(set.instruction("new"), "Brand new.");
        // Untouched builtins survive the merge.
        assert_eq!(
            set.instruction("default"),
            PersonaSet::default().instruction("default")
        );
    }

    #[test]
    fn test_malformed_override_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("personas.toml");
        std::fs::write(&path, "this is not { toml").unwrap();

        let set = PersonaSet::load(&path);
        assert_eq!(set.names(), PersonaSet::default().names());
    }

    #[test]
    fn test_missing_override_is_ignored() {
        let set = PersonaSet::load(Path::new("/nonexistent/personas.toml"));
        assert_eq!(set.names(), PersonaSet::default().names());
    }
}
