use serde::{Deserialize, Serialize};

use super::registry::CatalogEntry;

pub const DEFAULT_STYLE_ID: &str = "modern-industrieel";
pub const DEFAULT_BUILDING_TYPE_ID: &str = "warehouse";

/// Target architectural style. `prompt` is inserted into generation prompts verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleOption {
    pub id: String,
    pub name: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingTypeOption {
    pub id: String,
    pub name: String,
    pub prompt: String,
}

impl CatalogEntry for StyleOption {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl CatalogEntry for BuildingTypeOption {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn default_styles() -> Vec<StyleOption> {
    let mut styles = Vec::new();
    let mut insert = |id: &str, name: &str, prompt: &str| {
        styles.push(StyleOption {
            id: id.to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
        });
    };

    insert(
        "modern-industrieel",
        "Modern Industrieel",
        "modern industrial architecture with steel, glass and concrete, green accents, rooftop garden",
    );
    insert(
        "duurzaam-groen",
        "Duurzaam & Groen",
        "sustainable green architecture with living walls, solar panels, natural materials, biophilic design",
    );
    insert(
        "mixed-use",
        "Mixed-Use Complex",
        "mixed-use development with retail ground floor, offices and residential units, vibrant street life",
    );
    insert(
        "tech-hub",
        "Tech Hub",
        "innovative tech office building with smart building features, LED facades, modern minimalist design",
    );
    insert(
        "logistiek-modern",
        "Moderne Logistiek",
        "modern logistics center with efficient design, solar roof, green loading docks, sustainable warehouse",
    );
    styles
}

pub fn default_building_types() -> Vec<BuildingTypeOption> {
    let mut types = Vec::new();
    let mut insert = |id: &str, name: &str, prompt: &str| {
        types.push(BuildingTypeOption {
            id: id.to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
        });
    };

    insert("warehouse", "Loods / Warehouse", "industrial warehouse building");
    insert("office", "Kantoorpand", "office building");
    insert("retail", "Winkel / Retail", "retail commercial building");
    insert("factory", "Fabriek", "factory industrial building");
    insert("garage", "Garage / Werkplaats", "garage workshop building");
    types
}
