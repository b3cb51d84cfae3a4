//! samnotator - prompt-driven segmentation labeling core
//!
//! Keeps point and box prompts on image frames, groups them into tracked
//! instances, turns them into requests for a promptable segmentation model
//! and folds the model's masks back into per-instance detections.

pub mod color_utils;
pub mod config;
pub mod constants;
pub mod events;
pub mod format;
pub mod inference;
pub mod model;
pub mod session;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use session::{InferenceReport, Session, SessionError};
