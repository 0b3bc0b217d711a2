//! Seams between the step chain and the outside world.

pub mod checkpoint;
pub mod cleaner;
pub mod generator;
pub mod searcher;

pub use checkpoint::{Checkpoint, NoCheckpoint};
pub use cleaner::TextCleaner;
pub use generator::TextGenerator;
pub use searcher::{TavilyWebSearcher, WebSearcher};
