pub mod classifier;
pub mod gemini;
pub mod media;

use std::future::Future;

use anyhow::Result;

use crate::studio::compose::GenerationRequest;
use media::ImageAsset;

pub use gemini::GeminiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    ImageAndText,
    Text,
}

#[derive(Debug, Clone, Default)]
pub struct ContentReply {
    pub images: Vec<ImageAsset>,
    pub text: String,
}

impl ContentReply {
    pub fn first_image(self) -> Option<ImageAsset> {
        self.images.into_iter().next()
    }
}

/// One request/response round trip against a multimodal model.
pub trait ContentService: Send + Sync {
    fn generate_content(
        &self,
        request: &GenerationRequest,
        modality: ResponseModality,
    ) -> impl Future<Output = Result<ContentReply>> + Send;
}
