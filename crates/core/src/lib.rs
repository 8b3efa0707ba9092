pub mod error;
pub mod identity;
pub mod ids;
pub mod layout;
pub mod normalize;
pub mod operations;
pub mod review;

pub use error::CoreError;
pub use ids::*;
pub use normalize::{Normalizer, RawReview};
pub use operations::{CellRef, PendingOp};
pub use review::{Platform, Rating, Review, ReviewFields};
