mod mode;
mod options;
mod registry;

pub use mode::TransformMode;
pub use options::{
    default_building_types, default_styles, BuildingTypeOption, StyleOption,
    DEFAULT_BUILDING_TYPE_ID, DEFAULT_STYLE_ID,
};
pub use registry::{CatalogEntry, OptionRegistry};

/// The fixed selection lists offered to the user.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub styles: OptionRegistry<StyleOption>,
    pub building_types: OptionRegistry<BuildingTypeOption>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            styles: OptionRegistry::new("style", default_styles()),
            building_types: OptionRegistry::new("building type", default_building_types()),
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn style(&self, id: &str) -> anyhow::Result<StyleOption> {
        self.styles.require(id)
    }

    pub fn building_type(&self, id: &str) -> anyhow::Result<BuildingTypeOption> {
        self.building_types.require(id)
    }

    pub fn default_style(&self) -> anyhow::Result<StyleOption> {
        self.style(DEFAULT_STYLE_ID)
    }

    pub fn default_building_type(&self) -> anyhow::Result<BuildingTypeOption> {
        self.building_type(DEFAULT_BUILDING_TYPE_ID)
    }
}
