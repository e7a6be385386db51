pub mod compose;
pub mod crop;
pub mod error;
pub mod presets;
pub mod session;

pub use crop::CropAspect;
pub use presets::ShotType;
pub use session::{save_generated, GenerationResult, Studio};
