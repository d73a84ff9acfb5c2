pub mod camera;
pub mod channels;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod live;
pub mod logging;
pub mod pose;
pub mod reference;
pub mod render;
pub mod scoring;
pub mod signal;

#[cfg(test)]
mod testing;

pub use engine::Engine;
pub use error::EngineError;
