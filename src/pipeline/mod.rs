//! Pipeline module - cleaning, survey design, model fitting and diagnostics

pub mod analysis;
pub mod classification;
pub mod cleaner;
pub mod design;
pub mod distributions;
pub mod estimate;
pub mod inference;
pub mod irls;
pub mod linalg;
pub mod loader;
pub mod model;
pub mod prediction;
pub mod recode;
pub mod roc;
pub mod terms;
pub mod weights;

pub use analysis::*;
pub use classification::*;
pub use cleaner::*;
pub use design::*;
pub use estimate::*;
pub use inference::*;
pub use irls::{fit_irls, IrlsError, IrlsFit};
pub use loader::*;
pub use model::*;
pub use prediction::*;
pub use roc::*;
pub use terms::*;
pub use weights::*;
