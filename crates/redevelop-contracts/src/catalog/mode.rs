use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Whether a generation keeps the existing structure or replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformMode {
    #[default]
    #[serde(alias = "renovatie")]
    Renovation,
    #[serde(alias = "volledig")]
    FullRedevelopment,
}

impl TransformMode {
    pub const ALL: [TransformMode; 2] = [TransformMode::Renovation, TransformMode::FullRedevelopment];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMode::Renovation => "renovation",
            TransformMode::FullRedevelopment => "full-redevelopment",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransformMode::Renovation => "Renovation",
            TransformMode::FullRedevelopment => "Full redevelopment",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TransformMode::Renovation => "Adjust the facade, keep the structure",
            TransformMode::FullRedevelopment => "New building, same plot and surroundings",
        }
    }
}

impl fmt::Display for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "renovation" | "renovatie" => Ok(TransformMode::Renovation),
            "full-redevelopment" | "full" | "volledig" => Ok(TransformMode::FullRedevelopment),
            other => bail!(
                "unknown transform mode '{other}' (expected renovation or full-redevelopment)"
            ),
        }
    }
}
