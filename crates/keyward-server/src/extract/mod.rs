//! Request extractors with error responses in the server's JSON format.

mod reject;

pub use crate::extract::reject::Json;
