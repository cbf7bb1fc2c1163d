//! Status vocabulary and the configuration provider it is read from.
//!
//! The set of statuses is data-driven: administrators edit definitions on a
//! separate surface and the engine only reads them. Every lookup here is
//! tolerant of missing definitions and falls back to a deterministic
//! default instead of failing.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::names_match;

// ---------------------------------------------------------------------------
// Well-known status names
// ---------------------------------------------------------------------------

/// Nothing has been checked yet.
pub const STATUS_NOT_STARTED: &str = "Not Started";
/// Some, but not all, work is checked.
pub const STATUS_IN_PROGRESS: &str = "In Progress";
/// Terminal status; sets `completed_at` on projects.
pub const STATUS_DONE: &str = "Done";

/// Colour used when a status has no definition.
pub const NEUTRAL_COLOR: &str = "#9CA3AF";
/// Text colour used when a status has no definition.
pub const NEUTRAL_TEXT_COLOR: &str = "#111827";

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Which listing a status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayBucket {
    #[default]
    Table,
    Archive,
}

/// One entry of the configurable status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub name: String,
    pub color: String,
    #[serde(rename = "textColor", default = "default_text_color")]
    pub text_color: String,
    #[serde(rename = "useAutoContrast", default)]
    pub use_auto_contrast: bool,
    pub order: i32,
    #[serde(rename = "displayIn", default)]
    pub display_in: DisplayBucket,
    /// `None` on legacy definitions created before the manual flag existed.
    #[serde(default)]
    pub is_manual: Option<bool>,
    #[serde(default)]
    pub auto_trigger_from_action: Option<bool>,
}

fn default_text_color() -> String {
    NEUTRAL_TEXT_COLOR.to_string()
}

impl StatusDefinition {
    /// A plain, automatic, table-bucket definition.
    pub fn new(name: impl Into<String>, color: impl Into<String>, order: i32) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            text_color: default_text_color(),
            use_auto_contrast: false,
            order,
            display_in: DisplayBucket::Table,
            is_manual: None,
            auto_trigger_from_action: None,
        }
    }

    pub fn manual(mut self, is_manual: bool) -> Self {
        self.is_manual = Some(is_manual);
        self
    }

    pub fn auto_trigger(mut self) -> Self {
        self.auto_trigger_from_action = Some(true);
        self
    }

    pub fn archived(mut self) -> Self {
        self.display_in = DisplayBucket::Archive;
        self
    }
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Read-only source of status definitions, injected into the engine.
pub trait StatusConfigProvider: Send + Sync {
    /// All definitions, sorted by `order`.
    fn definitions(&self) -> &[StatusDefinition];

    /// Case- and whitespace-insensitive lookup by name.
    fn find(&self, name: &str) -> Option<&StatusDefinition> {
        self.definitions().iter().find(|d| names_match(&d.name, name))
    }

    /// First status by `order`, used when a record has no usable status.
    fn default_status(&self) -> Option<&StatusDefinition> {
        self.definitions().first()
    }

    /// Name of the default status, falling back to "Not Started" when the
    /// configuration is empty.
    fn default_status_name(&self) -> String {
        self.default_status()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| STATUS_NOT_STARTED.to_string())
    }

    /// Colour for a status, or [`NEUTRAL_COLOR`] when it is not configured.
    fn color_for(&self, name: &str) -> &str {
        self.find(name).map(|d| d.color.as_str()).unwrap_or(NEUTRAL_COLOR)
    }

    /// Statuses shown in the given listing, in order.
    fn in_bucket(&self, bucket: DisplayBucket) -> Vec<&StatusDefinition> {
        self.definitions()
            .iter()
            .filter(|d| d.display_in == bucket)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// In-memory catalog
// ---------------------------------------------------------------------------

/// In-memory [`StatusConfigProvider`] built from a list of definitions.
#[derive(Debug, Clone, Default)]
pub struct StatusCatalog {
    definitions: Vec<StatusDefinition>,
}

impl StatusCatalog {
    /// Build a catalog, validating every definition and sorting by `order`.
    pub fn new(mut definitions: Vec<StatusDefinition>) -> Result<Self, CoreError> {
        for def in &definitions {
            validate_definition(def)?;
        }
        for (i, def) in definitions.iter().enumerate() {
            if definitions[..i].iter().any(|d| names_match(&d.name, &def.name)) {
                return Err(CoreError::Conflict(format!(
                    "Duplicate status name '{}'",
                    def.name
                )));
            }
        }
        definitions.sort_by_key(|d| d.order);
        Ok(Self { definitions })
    }

    /// The vocabulary a fresh installation ships with.
    pub fn builtin() -> Self {
        let definitions = vec![
            StatusDefinition::new(STATUS_NOT_STARTED, "#E5E7EB", 0).manual(false),
            StatusDefinition::new(STATUS_IN_PROGRESS, "#3B82F6", 1).manual(false),
            StatusDefinition::new("On Review", "#8B5CF6", 2)
                .manual(true)
                .auto_trigger(),
            StatusDefinition::new("On List Lightroom", "#F59E0B", 3).manual(true),
            StatusDefinition::new("Babysit", "#EC4899", 4).manual(true),
            StatusDefinition::new("On Hold", "#6B7280", 5).manual(true),
            StatusDefinition::new("Canceled", "#EF4444", 6)
                .manual(true)
                .archived(),
            StatusDefinition::new(STATUS_DONE, "#10B981", 7)
                .manual(true)
                .archived(),
        ];
        Self { definitions }
    }
}

impl StatusConfigProvider for StatusCatalog {
    fn definitions(&self) -> &[StatusDefinition] {
        &self.definitions
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a single status definition.
pub fn validate_definition(def: &StatusDefinition) -> Result<(), CoreError> {
    if def.name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Status name must not be empty".to_string(),
        ));
    }
    validate_color(&def.color)?;
    validate_color(&def.text_color)
}

/// Validate that a colour is in hex format `#RRGGBB`.
pub fn validate_color(color: &str) -> Result<(), CoreError> {
    if color.len() != 7 || !color.starts_with('#') {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must be in #RRGGBB hex format"
        )));
    }

    if !color[1..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must contain only hex digits after '#'"
        )));
    }

    Ok(())
}
