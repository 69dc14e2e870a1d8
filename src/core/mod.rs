pub mod backend;
pub mod lifecycle;
pub mod metadata;
pub mod sse;
pub mod store;
pub mod suggestions;
pub mod terminal;
pub mod types;
