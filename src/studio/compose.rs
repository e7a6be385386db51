//! Builds the ordered text/image segments for one generation call.
//!
//! A fresh request is `[instruction, hero, inspiration?, brief, directive]`.
//! A refinement is `[editing instruction, hero, inspiration?, brief, prior
//! result, directive]`, where the editing instruction pins the output to the
//! prior result's decoded pixel size.

use crate::llm::media::ImageAsset;
use crate::studio::error::StudioError;
use crate::studio::presets::{
    template_for, ShotType, FRESH_DIRECTIVE, REFINE_DEFAULT_BRIEF, REFINE_DIRECTIVE,
    REFINE_INSTRUCTION,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSegment {
    Text(String),
    Image { data: String, mime_type: String },
}

impl ContentSegment {
    pub fn text(value: impl Into<String>) -> Self {
        ContentSegment::Text(value.into())
    }

    /// Base64 of the sourced bytes; the payload is never transcoded.
    pub fn image(asset: &ImageAsset) -> Self {
        ContentSegment::Image {
            data: asset.to_base64(),
            mime_type: asset.mime_type.clone(),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentSegment::Image { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    segments: Vec<ContentSegment>,
}

impl GenerationRequest {
    pub fn from_segments(segments: Vec<ContentSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[ContentSegment] {
        &self.segments
    }

    pub fn image_count(&self) -> usize {
        self.segments.iter().filter(|segment| segment.is_image()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionMode {
    Fresh,
    Refine,
}

#[derive(Debug, Clone, Copy)]
pub struct ComposeInput<'a> {
    pub shot: ShotType,
    pub hero: &'a ImageAsset,
    pub inspiration: Option<&'a ImageAsset>,
    pub brief: Option<&'a str>,
    /// The result being refined. Its presence selects refinement mode.
    pub prior: Option<&'a ImageAsset>,
}

impl ComposeInput<'_> {
    pub fn mode(&self) -> CompositionMode {
        if self.prior.is_some() {
            CompositionMode::Refine
        } else {
            CompositionMode::Fresh
        }
    }

    fn brief_text(&self) -> Option<&str> {
        self.brief.map(str::trim).filter(|brief| !brief.is_empty())
    }
}

pub fn compose(input: &ComposeInput<'_>) -> Result<GenerationRequest, StudioError> {
    let template = template_for(input.shot);
    let mut segments = Vec::with_capacity(6);

    match input.prior {
        None => {
            segments.push(ContentSegment::text(template.instruction));
            segments.push(ContentSegment::image(input.hero));
            if let Some(inspiration) = input.inspiration {
                segments.push(ContentSegment::image(inspiration));
            }
            let brief = input.brief_text().unwrap_or(template.default_brief);
            segments.push(ContentSegment::text(format!("Creative brief: {brief}")));
            segments.push(ContentSegment::text(FRESH_DIRECTIVE));
        }
        Some(prior) => {
            let (width, height) = prior.dimensions()?;
            let instruction = REFINE_INSTRUCTION
                .replace("{identity_rule}", template.identity_rule)
                .replace("{width}", &width.to_string())
                .replace("{height}", &height.to_string());
            segments.push(ContentSegment::text(instruction));
            segments.push(ContentSegment::image(input.hero));
            if let Some(inspiration) = input.inspiration {
                segments.push(ContentSegment::image(inspiration));
            }
            let brief = input.brief_text().unwrap_or(REFINE_DEFAULT_BRIEF);
            segments.push(ContentSegment::text(format!("Creative brief: {brief}")));
            segments.push(ContentSegment::image(prior));
            segments.push(ContentSegment::text(REFINE_DIRECTIVE));
        }
    }

    Ok(GenerationRequest::from_segments(segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::media::tests::png_fixture;

    impl GenerationRequest {
        pub(crate) fn texts(&self) -> impl Iterator<Item = &str> {
            self.segments.iter().filter_map(|segment| match segment {
                ContentSegment::Text(text) => Some(text.as_str()),
                ContentSegment::Image { .. } => None,
            })
        }
    }

    fn asset(width: u32, height: u32, shade: u8) -> ImageAsset {
        ImageAsset::from_bytes(png_fixture(width, height, shade), None).unwrap()
    }

    fn count_image(request: &GenerationRequest, asset: &ImageAsset) -> usize {
        let expected = ContentSegment::image(asset);
        request
            .segments()
            .iter()
            .filter(|segment| **segment == expected)
            .count()
    }

    #[test]
    fn fresh_without_extras_has_only_the_hero_image() {
        let hero = asset(8, 8, 10);
        let request = compose(&ComposeInput {
            shot: ShotType::Model,
            hero: &hero,
            inspiration: None,
            brief: None,
            prior: None,
        })
        .unwrap();

        assert_eq!(request.image_count(), 1);
        assert_eq!(request.segments().len(), 4);
        assert_eq!(request.segments()[1], ContentSegment::image(&hero));
        let default_brief = template_for(ShotType::Model).default_brief;
        assert!(request.texts().any(|text| text.contains(default_brief)));
        assert_eq!(request.texts().last(), Some(FRESH_DIRECTIVE));
    }

    #[test]
    fn fresh_with_inspiration_orders_hero_before_inspiration() {
        let hero = asset(8, 8, 10);
        let inspiration = asset(8, 8, 20);
        let request = compose(&ComposeInput {
            shot: ShotType::Product,
            hero: &hero,
            inspiration: Some(&inspiration),
            brief: Some("  On black marble  "),
            prior: None,
        })
        .unwrap();

        let segments = request.segments();
        assert_eq!(segments.len(), 5);
        assert_eq!(
            segments[0],
            ContentSegment::text(template_for(ShotType::Product).instruction)
        );
        assert_eq!(segments[1], ContentSegment::image(&hero));
        assert_eq!(segments[2], ContentSegment::image(&inspiration));
        assert_eq!(segments[3], ContentSegment::text("Creative brief: On black marble"));
    }

    #[test]
    fn blank_brief_falls_back_to_default() {
        let hero = asset(8, 8, 10);
        let request = compose(&ComposeInput {
            shot: ShotType::Product,
            hero: &hero,
            inspiration: None,
            brief: Some("   "),
            prior: None,
        })
        .unwrap();
        let default_brief = template_for(ShotType::Product).default_brief;
        assert!(request.texts().any(|text| text.contains(default_brief)));
    }

    #[test]
    fn segment_presence_tracks_inputs() {
        let hero = asset(8, 8, 10);
        let inspiration = asset(8, 8, 20);
        let prior = asset(12, 6, 30);

        for with_inspiration in [false, true] {
            for with_prior in [false, true] {
                let input = ComposeInput {
                    shot: ShotType::Model,
                    hero: &hero,
                    inspiration: with_inspiration.then_some(&inspiration),
                    brief: Some("Rooftop at dusk"),
                    prior: with_prior.then_some(&prior),
                };
                let request = compose(&input).unwrap();
                assert_eq!(count_image(&request, &hero), 1);
                assert_eq!(count_image(&request, &inspiration), usize::from(with_inspiration));
                assert_eq!(count_image(&request, &prior), usize::from(with_prior));
                assert_eq!(
                    input.mode(),
                    if with_prior {
                        CompositionMode::Refine
                    } else {
                        CompositionMode::Fresh
                    }
                );
            }
        }
    }

    #[test]
    fn refinement_embeds_prior_dimensions_and_places_prior_last() {
        let hero = asset(8, 8, 10);
        let prior = asset(96, 54, 30);
        let request = compose(&ComposeInput {
            shot: ShotType::Model,
            hero: &hero,
            inspiration: None,
            brief: None,
            prior: Some(&prior),
        })
        .unwrap();

        let segments = request.segments();
        let ContentSegment::Text(instruction) = &segments[0] else {
            panic!("first segment must be the editing instruction");
        };
        assert!(instruction.contains("96x54"));
        assert!(instruction.contains(template_for(ShotType::Model).identity_rule));
        assert!(request.texts().any(|text| text.contains(REFINE_DEFAULT_BRIEF)));
        assert_eq!(segments[segments.len() - 2], ContentSegment::image(&prior));
        assert_eq!(request.texts().last(), Some(REFINE_DIRECTIVE));
    }

    #[test]
    fn product_refinement_does_not_ask_to_preserve_a_model() {
        let hero = asset(8, 8, 10);
        let prior = asset(10, 10, 30);
        let request = compose(&ComposeInput {
            shot: ShotType::Product,
            hero: &hero,
            inspiration: None,
            brief: None,
            prior: Some(&prior),
        })
        .unwrap();
        let instruction = request.texts().next().unwrap();
        assert!(instruction.contains(template_for(ShotType::Product).identity_rule));
        assert!(!instruction.contains(template_for(ShotType::Model).identity_rule));
    }

    #[test]
    fn undecodable_prior_fails_the_refinement() {
        let hero = asset(8, 8, 10);
        let broken = ImageAsset::new(vec![0u8; 16], "image/png".to_string(), None);
        let err = compose(&ComposeInput {
            shot: ShotType::Model,
            hero: &hero,
            inspiration: None,
            brief: Some("anything"),
            prior: Some(&broken),
        })
        .unwrap_err();
        assert!(matches!(err, StudioError::Decode(_)));
    }

    #[test]
    fn image_payload_is_the_sourced_bytes() {
        let hero = asset(5, 7, 99);
        let ContentSegment::Image { data, mime_type } = ContentSegment::image(&hero) else {
            unreachable!();
        };
        assert_eq!(mime_type, "image/png");
        assert_eq!(data, hero.to_base64());
    }
}
