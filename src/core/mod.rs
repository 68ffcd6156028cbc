//! Core engine module
//!
//! Contains the main Engine struct, the game loop, configuration and timing

mod config;
mod engine;
mod time;

pub use config::{ConfigError, EngineConfig, RendererConfig};
pub use engine::{Engine, EngineContext, Game};
pub use time::Time;
