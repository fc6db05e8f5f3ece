//! Data module - panel loading and transformation

mod group;
mod loader;
mod transform;

pub use group::PolicyGroup;
pub use loader::{DataLoadError, DataLoader};
pub use transform::{GroupCount, Observation, PanelTransformer, TransformError, GROUP_COLUMN};
