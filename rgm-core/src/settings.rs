use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Result, ScriptError};

/// How the 4-byte bound after a conditional's clause list is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalBounds {
    /// Byte length of the body, counted from just after the bound field.
    #[default]
    Length,
    /// Absolute offset of the body end within the script, as shipped game
    /// files store it.
    EndOffset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    /// Render unknown opcodes as empty statements instead of failing.
    pub lenient_opcodes: bool,
    pub conditional_bounds: ConditionalBounds,
    /// One indentation level in rendered text.
    pub indent: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            lenient_opcodes: false,
            conditional_bounds: ConditionalBounds::Length,
            indent: "\t".to_string(),
        }
    }
}

impl ScriptSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| ScriptError::Config(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ScriptError::Config(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// End of a conditional body given the stored bound and the offset just
    /// past the bound field.
    pub(crate) fn conditional_end(&self, bound: u32, body_start: usize) -> usize {
        match self.conditional_bounds {
            ConditionalBounds::Length => body_start.saturating_add(bound as usize),
            ConditionalBounds::EndOffset => bound as usize,
        }
    }

    /// Value to store in the bound field for a body spanning
    /// `body_start..body_end`.
    pub(crate) fn conditional_bound(&self, body_start: usize, body_end: usize) -> Result<u32> {
        let value = match self.conditional_bounds {
            ConditionalBounds::Length => body_end - body_start,
            ConditionalBounds::EndOffset => body_end,
        };
        u32::try_from(value)
            .map_err(|_| ScriptError::Format(format!("conditional body bound {value} overflows")))
    }

    pub(crate) fn indent_str(&self, depth: u32) -> String {
        self.indent.repeat(depth as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: ScriptSettings =
            serde_json::from_str(r#"{ "conditional_bounds": "end_offset" }"#).unwrap();
        assert_eq!(settings.conditional_bounds, ConditionalBounds::EndOffset);
        assert!(!settings.lenient_opcodes);
        assert_eq!(settings.indent, "\t");
    }

    #[test]
    fn conditional_bounds_follow_mode() {
        let mut settings = ScriptSettings::default();
        assert_eq!(settings.conditional_end(6, 20), 26);
        assert_eq!(settings.conditional_bound(20, 26).unwrap(), 6);

        settings.conditional_bounds = ConditionalBounds::EndOffset;
        assert_eq!(settings.conditional_end(26, 20), 26);
        assert_eq!(settings.conditional_bound(20, 26).unwrap(), 26);
    }

    #[test]
    fn load_rejects_bad_json() {
        let path = std::env::temp_dir().join("rgm_script_bad_settings.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ScriptSettings::load(&path).unwrap_err();
        assert!(matches!(err, ScriptError::Config(_)));
        let _ = fs::remove_file(&path);
    }
}
