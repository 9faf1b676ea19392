use redevelop_contracts::catalog::{BuildingTypeOption, StyleOption, TransformMode};

/// Builds the generation prompt. Deterministic in its inputs; catalog text is
/// interpolated verbatim.
pub fn build_prompt(
    has_reference: bool,
    mode: TransformMode,
    style: &StyleOption,
    building_type: &BuildingTypeOption,
) -> String {
    match (has_reference, mode) {
        (true, TransformMode::Renovation) => renovation_edit_prompt(style, building_type),
        (true, TransformMode::FullRedevelopment) => {
            redevelopment_edit_prompt(style, building_type)
        }
        (false, _) => from_scratch_prompt(style, building_type),
    }
}

fn renovation_edit_prompt(style: &StyleOption, building_type: &BuildingTypeOption) -> String {
    format!(
        "You are an expert in real estate development and architecture. Edit this photo of a {building} and create a realistic redevelopment in the style: {name} ({style_prompt}).

IMPORTANT GUIDELINES:
- KEEP the EXISTING scale, footprint and basic structure of the building
- This must be a TRANSFORMATION, not an entirely new building
- Keep the visible surroundings and context: same perspective, same camera angle, same cars, same road, same sky
- Be realistic about what is achievable with this specific building
- Only modernize the building facade and add green urban landscaping (trees, grass, hedges) to the public space
- The result must describe the ORIGINAL building with improvements, not a fantasy building
- Photorealistic architectural photography edit",
        building = building_type.prompt,
        name = style.name,
        style_prompt = style.prompt,
    )
}

fn redevelopment_edit_prompt(style: &StyleOption, building_type: &BuildingTypeOption) -> String {
    format!(
        "You are an expert in real estate development and architecture. Edit this photo: replace the {building} with a completely new building in the style: {name} ({style_prompt}).

IMPORTANT GUIDELINES:
- The new building must fit on the EXACT SAME plot/parcel as the current building. Do NOT make it wider or take space from neighboring properties
- Keep the EXACT same perspective, camera angle, and viewpoint
- Keep ALL surroundings exactly the same: same cars on the road, same street, same sky, same neighboring buildings, same trees that are not on the plot
- Only replace the building itself and add green urban landscaping (trees, grass, hedges) to the public space directly around it
- The new building should be a realistic, buildable design - not a fantasy
- Photorealistic architectural photography, same lighting conditions as original photo",
        building = building_type.prompt,
        name = style.name,
        style_prompt = style.prompt,
    )
}

fn from_scratch_prompt(style: &StyleOption, building_type: &BuildingTypeOption) -> String {
    format!(
        "Architectural photography of a renovated {building} transformed into {style_prompt} ({name} style). The building maintains its original footprint and scale but features a completely modernized exterior. This is a realistic transformation, not a fantasy building. Keep the surroundings urban and contextual. Add green public space with trees, grass and hedges around the building. Professional architectural visualization, golden hour lighting, photorealistic, street-level perspective, high-end real estate photography style",
        building = building_type.prompt,
        style_prompt = style.prompt,
        name = style.name,
    )
}
