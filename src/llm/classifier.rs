use tracing::{debug, info, warn};

use crate::llm::media::ImageAsset;
use crate::llm::{ContentService, ResponseModality};
use crate::studio::compose::{ContentSegment, GenerationRequest};
use crate::studio::presets::{ItemCategory, CLASSIFIER_INSTRUCTION};

pub fn classification_request(hero: &ImageAsset) -> GenerationRequest {
    GenerationRequest::from_segments(vec![
        ContentSegment::image(hero),
        ContentSegment::text(CLASSIFIER_INSTRUCTION),
    ])
}

/// Never fails: any service error or empty answer becomes `Other`.
pub async fn classify_item<S: ContentService>(service: &S, hero: &ImageAsset) -> ItemCategory {
    let request = classification_request(hero);
    match service
        .generate_content(&request, ResponseModality::Text)
        .await
    {
        Ok(reply) => {
            let label = reply.text.trim();
            if label.is_empty() {
                debug!("Classifier returned an empty answer; using Other");
                return ItemCategory::Other;
            }
            let category = ItemCategory::from_label(label);
            if category.is_known() {
                info!("Hero item classified as {}", category);
            } else {
                info!("Hero item classified with unlisted label '{}'", label);
            }
            category
        }
        Err(err) => {
            warn!("Item classification failed, defaulting to Other: {err:#}");
            ItemCategory::Other
        }
    }
}
