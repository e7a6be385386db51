use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::llm::classifier::classify_item;
use crate::llm::media::{extension_for_mime, ImageAsset};
use crate::llm::{ContentService, ResponseModality};
use crate::studio::compose::{compose, ComposeInput, CompositionMode};
use crate::studio::crop::{export_image, CropAspect};
use crate::studio::error::StudioError;
use crate::studio::presets::{shot_types_for, ItemCategory, ShotType};
use crate::utils::timing::{complete_action_timer, start_action_timer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Image(ImageAsset),
    Failed {
        message: String,
        /// The last good image, kept only when failed refinements retain it.
        retained: Option<ImageAsset>,
    },
}

impl GenerationResult {
    pub fn image(&self) -> Option<&ImageAsset> {
        match self {
            GenerationResult::Image(image) => Some(image),
            GenerationResult::Failed { retained, .. } => retained.as_ref(),
        }
    }
}

/// Identifies the hero upload a classification was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationTicket(u64);

#[derive(Debug, Default)]
struct SessionState {
    hero: Option<ImageAsset>,
    inspiration: Option<ImageAsset>,
    category: Option<ItemCategory>,
    classification_generation: u64,
    shot: ShotType,
    brief: String,
    result: Option<GenerationResult>,
    generating: bool,
}

impl SessionState {
    fn reset_invalid_shot(&mut self) {
        if !shot_types_for(self.category.as_ref()).contains(&self.shot) {
            debug!("Shot type {} no longer available; switching to model", self.shot);
            self.shot = ShotType::Model;
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub hero: Option<String>,
    pub inspiration: Option<String>,
    pub category: Option<ItemCategory>,
    pub shot: ShotType,
    pub available_shots: &'static [ShotType],
    pub brief: String,
    pub result: Option<GenerationResult>,
    pub generating: bool,
}

/// Clears the in-flight flag however the generation settles.
struct InFlight {
    state: Arc<Mutex<SessionState>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.state.lock().generating = false;
    }
}

/// The editing session: current inputs, at most one live result, and the
/// guards that keep concurrent generation and classification well ordered.
pub struct Studio<S> {
    service: Result<Arc<S>, ConfigError>,
    state: Arc<Mutex<SessionState>>,
    keep_result_on_failed_refinement: bool,
}

impl<S> Clone for Studio<S> {
    fn clone(&self) -> Self {
        Studio {
            service: self.service.clone(),
            state: Arc::clone(&self.state),
            keep_result_on_failed_refinement: self.keep_result_on_failed_refinement,
        }
    }
}

impl<S: ContentService> Studio<S> {
    pub fn new(service: Result<S, ConfigError>, keep_result_on_failed_refinement: bool) -> Self {
        if let Err(err) = &service {
            warn!("Generation disabled: {err}");
        }
        Studio {
            service: service.map(Arc::new),
            state: Arc::new(Mutex::new(SessionState::default())),
            keep_result_on_failed_refinement,
        }
    }

    pub fn config_error(&self) -> Option<&ConfigError> {
        self.service.as_ref().err()
    }

    #[cfg(test)]
    pub(crate) fn service_for_tests(&self) -> &S {
        match &self.service {
            Ok(service) => service.as_ref(),
            Err(err) => panic!("no service configured: {err}"),
        }
    }

    /// Replaces the hero image. Any pending classification for the previous
    /// hero becomes stale.
    pub fn set_hero(&self, asset: ImageAsset) -> ClassificationTicket {
        let mut state = self.state.lock();
        if let Some(previous) = state.hero.replace(asset) {
            debug!("Released hero image {}", previous.display_name());
        }
        state.category = None;
        state.classification_generation += 1;
        state.reset_invalid_shot();
        ClassificationTicket(state.classification_generation)
    }

    pub fn remove_hero(&self) {
        let mut state = self.state.lock();
        if let Some(previous) = state.hero.take() {
            debug!("Released hero image {}", previous.display_name());
        }
        state.category = None;
        state.classification_generation += 1;
        state.reset_invalid_shot();
    }

    pub fn set_inspiration(&self, asset: Option<ImageAsset>) {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut state.inspiration, asset);
        if let Some(previous) = previous {
            debug!("Released inspiration image {}", previous.display_name());
        }
    }

    pub fn set_brief(&self, brief: &str) {
        self.state.lock().brief = brief.trim().to_string();
    }

    pub fn select_shot(&self, shot: ShotType) -> Result<(), StudioError> {
        let mut state = self.state.lock();
        if !shot_types_for(state.category.as_ref()).contains(&shot) {
            return Err(StudioError::ShotUnavailable {
                shot,
                category: state.category.clone().unwrap_or(ItemCategory::Other),
            });
        }
        state.shot = shot;
        Ok(())
    }

    /// Applies a classification only if no newer hero replaced the one it was
    /// started for.
    pub fn apply_classification(&self, ticket: ClassificationTicket, category: ItemCategory) -> bool {
        let mut state = self.state.lock();
        if state.classification_generation != ticket.0 {
            debug!(
                "Discarding stale classification {} (ticket {}, current {})",
                category, ticket.0, state.classification_generation
            );
            return false;
        }
        state.category = Some(category);
        state.reset_invalid_shot();
        true
    }

    /// Classifies the current hero. Returns the applied category, or `None`
    /// when the ticket went stale. Never reports an error.
    pub async fn classify_hero(&self, ticket: ClassificationTicket) -> Option<ItemCategory> {
        let hero = {
            let state = self.state.lock();
            if state.classification_generation != ticket.0 {
                return None;
            }
            state.hero.clone()?
        };

        let category = match &self.service {
            Ok(service) => classify_item(service.as_ref(), &hero).await,
            Err(err) => {
                debug!("Skipping classification, client unavailable: {err}");
                ItemCategory::Other
            }
        };

        self.apply_classification(ticket, category.clone())
            .then_some(category)
    }

    fn claim_generation(&self) -> Result<InFlight, StudioError> {
        let mut state = self.state.lock();
        if state.generating {
            return Err(StudioError::Busy);
        }
        state.generating = true;
        Ok(InFlight {
            state: Arc::clone(&self.state),
        })
    }

    /// Runs one generation: fresh when no result is live, otherwise a
    /// refinement of the live result.
    pub async fn generate(&self) -> Result<ImageAsset, StudioError> {
        let service = self.service.as_ref().map_err(|err| err.clone())?;
        let _in_flight = self.claim_generation()?;

        let (hero, inspiration, brief, shot, category, prior) = {
            let state = self.state.lock();
            let hero = state.hero.clone().ok_or(StudioError::MissingHero)?;
            (
                hero,
                state.inspiration.clone(),
                state.brief.clone(),
                state.shot,
                state.category.clone(),
                state.result.as_ref().and_then(|result| result.image()).cloned(),
            )
        };
        if !shot_types_for(category.as_ref()).contains(&shot) {
            return Err(StudioError::ShotUnavailable {
                shot,
                category: category.unwrap_or(ItemCategory::Other),
            });
        }

        let input = ComposeInput {
            shot,
            hero: &hero,
            inspiration: inspiration.as_ref(),
            brief: Some(brief.as_str()),
            prior: prior.as_ref(),
        };
        let mode = input.mode();
        let action = match mode {
            CompositionMode::Fresh => "generate",
            CompositionMode::Refine => "refine",
        };
        let mut timer = start_action_timer(action, Some(brief.as_str()));

        let outcome = match compose(&input) {
            Ok(request) => match service
                .generate_content(&request, ResponseModality::ImageAndText)
                .await
            {
                Ok(reply) => reply.first_image().ok_or_else(|| {
                    StudioError::Generation("the model did not return an image".to_string())
                }),
                Err(err) => Err(StudioError::Generation(format!("{err:#}"))),
            },
            Err(err) => Err(err),
        };

        let mut state = self.state.lock();
        match outcome {
            Ok(image) => {
                info!(
                    "{} succeeded ({} bytes, {})",
                    action,
                    image.bytes.len(),
                    image.mime_type
                );
                state.result = Some(GenerationResult::Image(image.clone()));
                complete_action_timer(&mut timer, "success", None);
                Ok(image)
            }
            Err(err) => {
                warn!("{} failed: {}", action, err);
                let retained = if mode == CompositionMode::Refine && self.keep_result_on_failed_refinement {
                    prior
                } else {
                    None
                };
                state.result = Some(GenerationResult::Failed {
                    message: err.to_string(),
                    retained,
                });
                complete_action_timer(&mut timer, "error", Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Makes an existing image the live result, so the next generation
    /// refines it.
    pub fn adopt_result(&self, image: ImageAsset) {
        let mut state = self.state.lock();
        if let Some(previous) = state.result.replace(GenerationResult::Image(image)) {
            if previous.image().is_some() {
                debug!("Released previous generation result");
            }
        }
    }

    /// Discards the live result so the next generation starts fresh.
    pub fn start_over(&self) {
        let mut state = self.state.lock();
        if state.result.take().is_some() {
            debug!("Discarded generation result");
        }
    }

    pub fn result_image(&self) -> Option<ImageAsset> {
        self.state
            .lock()
            .result
            .as_ref()
            .and_then(|result| result.image())
            .cloned()
    }

    pub async fn export(&self, aspect: CropAspect, dir: &Path) -> Result<PathBuf, StudioError> {
        let image = self
            .result_image()
            .ok_or_else(|| StudioError::Export("there is no generated image to export".to_string()))?;
        let mut timer = start_action_timer("export", Some(aspect.label()));
        match export_image(&image, aspect, dir).await {
            Ok(path) => {
                complete_action_timer(&mut timer, "success", Some(path.display().to_string()));
                Ok(path)
            }
            Err(err) => {
                complete_action_timer(&mut timer, "error", Some(err.to_string()));
                Err(err)
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            hero: state.hero.as_ref().map(ImageAsset::display_name),
            inspiration: state.inspiration.as_ref().map(ImageAsset::display_name),
            category: state.category.clone(),
            shot: state.shot,
            available_shots: shot_types_for(state.category.as_ref()),
            brief: state.brief.clone(),
            result: state.result.clone(),
            generating: state.generating,
        }
    }
}

/// Writes a generated image to `dir` under a timestamped name.
pub async fn save_generated(asset: &ImageAsset, dir: &Path) -> Result<PathBuf, StudioError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| StudioError::Export(format!("{}: {}", dir.display(), err)))?;
    let name = format!(
        "lookbook-{}.{}",
        Utc::now().format("%Y%m%d-%H%M%S%3f"),
        extension_for_mime(&asset.mime_type)
    );
    let path = dir.join(name);
    tokio::fs::write(&path, &asset.bytes)
        .await
        .map_err(|err| StudioError::Export(format!("{}: {}", path.display(), err)))?;
    Ok(path)
}
