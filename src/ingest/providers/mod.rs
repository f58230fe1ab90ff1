// src/ingest/providers/mod.rs
pub mod fixture;
pub mod reddit;

pub use fixture::{FixtureSession, FixtureSource, FixtureStep};
pub use reddit::RedditSource;
