use crate::config::ConfigError;
use crate::studio::presets::{ItemCategory, ShotType};

/// Failures a studio action can report to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("Image generation failed: {0}")]
    Generation(String),
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Could not load image: {0}")]
    Load(String),
    #[error("Export failed: {0}")]
    Export(String),
    #[error("A generation is already in progress. Wait for it to finish.")]
    Busy,
    #[error("{shot} shots are not available for {category}")]
    ShotUnavailable {
        shot: ShotType,
        category: ItemCategory,
    },
    #[error("Add a hero item image first.")]
    MissingHero,
}
