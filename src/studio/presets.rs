//! Static option tables: item categories, shot types, suggested briefs,
//! style presets and the instruction templates the composer fills in.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemCategory {
    TShirt,
    Top,
    Jacket,
    Pants,
    Dress,
    Watch,
    Bracelet,
    Ring,
    Necklace,
    Earrings,
    Hat,
    Shoes,
    Handbag,
    Other,
    /// A classifier answer outside the enumeration, kept verbatim.
    Unlisted(String),
}

pub static KNOWN_CATEGORIES: [ItemCategory; 14] = [
    ItemCategory::TShirt,
    ItemCategory::Top,
    ItemCategory::Jacket,
    ItemCategory::Pants,
    ItemCategory::Dress,
    ItemCategory::Watch,
    ItemCategory::Bracelet,
    ItemCategory::Ring,
    ItemCategory::Necklace,
    ItemCategory::Earrings,
    ItemCategory::Hat,
    ItemCategory::Shoes,
    ItemCategory::Handbag,
    ItemCategory::Other,
];

pub static ACCESSORY_CATEGORIES: [ItemCategory; 6] = [
    ItemCategory::Watch,
    ItemCategory::Bracelet,
    ItemCategory::Ring,
    ItemCategory::Necklace,
    ItemCategory::Earrings,
    ItemCategory::Handbag,
];

impl ItemCategory {
    pub fn label(&self) -> &str {
        match self {
            ItemCategory::TShirt => "T-Shirt",
            ItemCategory::Top => "Top",
            ItemCategory::Jacket => "Jacket",
            ItemCategory::Pants => "Pants",
            ItemCategory::Dress => "Dress",
            ItemCategory::Watch => "Watch",
            ItemCategory::Bracelet => "Bracelet",
            ItemCategory::Ring => "Ring",
            ItemCategory::Necklace => "Necklace",
            ItemCategory::Earrings => "Earrings",
            ItemCategory::Hat => "Hat",
            ItemCategory::Shoes => "Shoes",
            ItemCategory::Handbag => "Handbag",
            ItemCategory::Other => "Other",
            ItemCategory::Unlisted(label) => label.as_str(),
        }
    }

    /// Exact label match only; anything else is carried as `Unlisted`.
    pub fn from_label(label: &str) -> Self {
        KNOWN_CATEGORIES
            .iter()
            .find(|category| category.label() == label)
            .cloned()
            .unwrap_or_else(|| ItemCategory::Unlisted(label.to_string()))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ItemCategory::Unlisted(_))
    }

    pub fn is_accessory(&self) -> bool {
        ACCESSORY_CATEGORIES.contains(self)
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShotType {
    #[default]
    Model,
    Product,
}

impl ShotType {
    pub fn label(self) -> &'static str {
        match self {
            ShotType::Model => "model",
            ShotType::Product => "product",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "model" => Some(ShotType::Model),
            "product" => Some(ShotType::Product),
            _ => None,
        }
    }
}

impl fmt::Display for ShotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn shot_types_for(category: Option<&ItemCategory>) -> &'static [ShotType] {
    match category {
        Some(category) if category.is_accessory() => &[ShotType::Model, ShotType::Product],
        _ => &[ShotType::Model],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetGroup {
    Apparel,
    Jewelry,
    Footwear,
    Bags,
    General,
}

static CATEGORY_GROUPS: [(ItemCategory, PresetGroup); 13] = [
    (ItemCategory::TShirt, PresetGroup::Apparel),
    (ItemCategory::Top, PresetGroup::Apparel),
    (ItemCategory::Jacket, PresetGroup::Apparel),
    (ItemCategory::Pants, PresetGroup::Apparel),
    (ItemCategory::Dress, PresetGroup::Apparel),
    (ItemCategory::Hat, PresetGroup::Apparel),
    (ItemCategory::Watch, PresetGroup::Jewelry),
    (ItemCategory::Bracelet, PresetGroup::Jewelry),
    (ItemCategory::Ring, PresetGroup::Jewelry),
    (ItemCategory::Necklace, PresetGroup::Jewelry),
    (ItemCategory::Earrings, PresetGroup::Jewelry),
    (ItemCategory::Shoes, PresetGroup::Footwear),
    (ItemCategory::Handbag, PresetGroup::Bags),
];

static SUGGESTED_BRIEFS: [(PresetGroup, &[&str]); 5] = [
    (
        PresetGroup::Apparel,
        &[
            "Walking down a sunlit city street, candid mid-stride",
            "Leaning against a concrete wall in soft overcast light",
            "Seated on a vintage chair in a minimalist studio",
            "Laughing on a rooftop at golden hour",
        ],
    ),
    (
        PresetGroup::Jewelry,
        &[
            "Close-up with the hand resting on the chin, soft window light",
            "Arranged on a slab of black marble with a single hard shadow",
            "Draped over a linen fold with morning sunlight",
            "Evening look at a candlelit dinner table",
        ],
    ),
    (
        PresetGroup::Footwear,
        &[
            "Stepping off a curb on wet cobblestones",
            "Low angle shot on a basketball court at dusk",
            "Resting on a wooden bench beside a paper bag of groceries",
        ],
    ),
    (
        PresetGroup::Bags,
        &[
            "Carried over the shoulder in a busy train station",
            "Placed on a cafe table next to an espresso cup",
            "Standing on a pedestal in a pastel-colored set",
        ],
    ),
    (
        PresetGroup::General,
        &[
            "A clean editorial portrait against a neutral backdrop",
            "An outdoor lifestyle scene in natural daylight",
        ],
    ),
];

pub fn preset_group_for(category: Option<&ItemCategory>) -> PresetGroup {
    category
        .and_then(|category| {
            CATEGORY_GROUPS
                .iter()
                .find(|(candidate, _)| candidate == category)
                .map(|(_, group)| *group)
        })
        .unwrap_or(PresetGroup::General)
}

pub fn suggested_briefs(category: Option<&ItemCategory>) -> &'static [&'static str] {
    let group = preset_group_for(category);
    SUGGESTED_BRIEFS
        .iter()
        .find(|(candidate, _)| *candidate == group)
        .map(|(_, briefs)| *briefs)
        .unwrap_or(&[])
}

#[derive(Debug, Clone, Copy)]
pub struct StylePreset {
    pub name: &'static str,
    pub brief: &'static str,
}

pub static STYLE_PRESETS: [StylePreset; 5] = [
    StylePreset {
        name: "studio",
        brief: "Shot in a bright white studio with soft diffused key light and a subtle floor shadow.",
    },
    StylePreset {
        name: "street",
        brief: "Urban street style, handheld 35mm feel, natural city light and shallow depth of field.",
    },
    StylePreset {
        name: "editorial",
        brief: "High-fashion magazine editorial, bold composition, dramatic directional lighting.",
    },
    StylePreset {
        name: "golden-hour",
        brief: "Outdoors at golden hour, warm backlight, gentle lens flare and long shadows.",
    },
    StylePreset {
        name: "noir",
        brief: "Moody low-key lighting, deep shadows and a muted, desaturated palette.",
    },
];

pub fn style_preset(name: &str) -> Option<&'static StylePreset> {
    let name = name.trim();
    STYLE_PRESETS
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
}

/// Instruction text for one shot type. `identity_rule` becomes priority (c)
/// of the editing instruction.
#[derive(Debug, Clone, Copy)]
pub struct ShotTemplate {
    pub shot: ShotType,
    pub instruction: &'static str,
    pub default_brief: &'static str,
    pub identity_rule: &'static str,
}

pub static PROMPT_TEMPLATES: [ShotTemplate; 2] = [
    ShotTemplate {
        shot: ShotType::Model,
        instruction: "You are a professional fashion photographer creating a lookbook image.\n\
            The first image is the HERO ITEM. Generate a photorealistic image of a NEW, entirely synthetic human model wearing or using exactly this item.\n\
            The hero item must be reproduced faithfully: same shape, color, material, pattern, logos and proportions.\n\
            If a second image is provided it is an INSPIRATION image. Use it ONLY for mood, lighting, color grading, composition and overall aesthetic.\n\
            STRICTLY FORBIDDEN: copying any person, face, body, pose, clothing or object from the inspiration image. The model must not resemble anyone in it.",
        default_brief: "Create a natural, editorial lifestyle photograph of the model wearing the item.",
        identity_rule: "If a model appears in the current image, preserve their identity, face and body exactly.",
    },
    ShotTemplate {
        shot: ShotType::Product,
        instruction: "You are a professional product photographer creating a lookbook image.\n\
            The first image is the HERO ITEM. Generate a photorealistic still-life composition featuring exactly this item.\n\
            The image must contain NO people, faces, hands or body parts of any kind.\n\
            The hero item must be reproduced faithfully: same shape, color, material, pattern, logos and proportions.\n\
            If a second image is provided it is an INSPIRATION image. Use it ONLY for mood, lighting, color grading, props style and overall aesthetic. Do not copy its objects.",
        default_brief: "Create a clean, elegant still-life product photograph of the item.",
        identity_rule: "This is a product shot: keep the scene free of any people, hands or body parts.",
    },
];

pub fn template_for(shot: ShotType) -> &'static ShotTemplate {
    PROMPT_TEMPLATES
        .iter()
        .find(|template| template.shot == shot)
        .unwrap_or(&PROMPT_TEMPLATES[0])
}

pub const REFINE_INSTRUCTION: &str = "EDITING MODE. You are editing the LAST image provided (the current result). \
Apply changes in this strict priority order:\n\
(a) If an INSPIRATION image is provided, it is the dominant style override: adopt its mood, lighting, color grading and aesthetic. Never copy its people, faces or objects.\n\
(b) The text brief steers the scene, setting and action.\n\
(c) {identity_rule}\n\
(d) Keep the HERO ITEM (the first image) accurate in shape, color, material, pattern and logos.\n\
(e) The output MUST be exactly {width}x{height} pixels, matching the current result's aspect ratio. Do not change the framing ratio.";

pub const REFINE_DEFAULT_BRIEF: &str =
    "Make a subtle improvement to the overall realism, lighting and detail without changing the composition.";

pub const FRESH_DIRECTIVE: &str = "Generate the image now. Respond with an image, not text.";

pub const REFINE_DIRECTIVE: &str =
    "Apply the edits to the current result now. Respond with the edited image, not text.";

pub const CLASSIFIER_INSTRUCTION: &str = "Classify the main clothing item or accessory in this image. \
Respond with exactly one of these labels and nothing else: \
T-Shirt, Top, Jacket, Pants, Dress, Watch, Bracelet, Ring, Necklace, Earrings, Hat, Shoes, Handbag, Other.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_shot_is_offered_only_for_accessories() {
        for category in KNOWN_CATEGORIES.iter() {
            let options = shot_types_for(Some(category));
            assert_eq!(
                options.contains(&ShotType::Product),
                ACCESSORY_CATEGORIES.contains(category),
                "unexpected shot options for {category}"
            );
            assert!(options.contains(&ShotType::Model));
        }
        assert_eq!(shot_types_for(None), &[ShotType::Model]);
        assert_eq!(
            shot_types_for(Some(&ItemCategory::Unlisted("Scarf".to_string()))),
            &[ShotType::Model]
        );
    }

    #[test]
    fn labels_map_exactly() {
        assert_eq!(ItemCategory::from_label("T-Shirt"), ItemCategory::TShirt);
        assert_eq!(ItemCategory::from_label("Handbag"), ItemCategory::Handbag);
        let unlisted = ItemCategory::from_label("handbag");
        assert_eq!(unlisted, ItemCategory::Unlisted("handbag".to_string()));
        assert!(!unlisted.is_known());
        assert!(!unlisted.is_accessory());
    }

    #[test]
    fn every_category_has_suggestions() {
        for category in KNOWN_CATEGORIES.iter() {
            assert!(!suggested_briefs(Some(category)).is_empty());
        }
        assert_eq!(preset_group_for(Some(&ItemCategory::Ring)), PresetGroup::Jewelry);
        assert_eq!(preset_group_for(None), PresetGroup::General);
    }

    #[test]
    fn templates_cover_both_shot_types() {
        assert_eq!(template_for(ShotType::Model).shot, ShotType::Model);
        assert_eq!(template_for(ShotType::Product).shot, ShotType::Product);
        assert_eq!(style_preset("Golden-Hour").map(|p| p.name), Some("golden-hour"));
    }
}
