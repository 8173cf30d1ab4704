//! Game-system profiles.
//!
//! Each supported system maps to where it stores hit points and how it names
//! size categories. Lookup is by id; anything unrecognized gets the generic
//! profile, which has an HP path but no size categories.

#[cfg(test)]
#[path = "system_test.rs"]
mod system_test;

use serde::{Deserialize, Serialize};

use crate::scene::Footprint;

/// Known game systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameSystem {
    Dnd5e,
    Pf2e,
    #[default]
    Generic,
}

impl GameSystem {
    /// Look up a system by id. Unknown ids map to `Generic`.
    #[must_use]
    pub fn from_id(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            "dnd5e" => Self::Dnd5e,
            "pf2e" => Self::Pf2e,
            _ => Self::Generic,
        }
    }

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Dnd5e => "dnd5e",
            Self::Pf2e => "pf2e",
            Self::Generic => "generic",
        }
    }

    /// Attribute path of the hit-point block.
    #[must_use]
    pub fn hp_attribute_path(self) -> &'static str {
        match self {
            Self::Dnd5e | Self::Pf2e => "system.attributes.hp",
            Self::Generic => "system.hp",
        }
    }

    /// Size category for a footprint, keyed by its larger side in cells.
    #[must_use]
    pub fn size_for(self, footprint: Footprint) -> Option<&'static str> {
        let cells = footprint.width.max(footprint.height);
        let table: &[(f64, &'static str)] = match self {
            Self::Dnd5e | Self::Pf2e => &[(0.5, "tiny"), (1.0, "med"), (2.0, "lg"), (3.0, "huge")],
            Self::Generic => return None,
        };
        let size = table.iter().find(|(max, _)| cells <= *max).map_or("grg", |(_, name)| name);
        Some(size)
    }
}
