// HTTP routes
pub mod error;
pub mod generation;
pub mod health;
pub mod jobs;

pub use error::ApiError;
pub use generation::*;
pub use health::*;
pub use jobs::*;
