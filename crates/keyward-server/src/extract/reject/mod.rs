//! Extractors whose rejections are converted into [`Error`]s.
//!
//! [`Error`]: crate::handler::Error

mod enhanced_json;

pub use enhanced_json::Json;
