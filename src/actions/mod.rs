pub mod normalize;
pub mod types;

pub use normalize::normalize;
pub use types::{Action, NormalizedPoint, Target};
