//! Response types for HTTP handlers.

mod errors;

pub use errors::ErrorResponse;

pub use crate::handler::request::Message;
