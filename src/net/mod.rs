//! Request/response descriptors and the network seam.

mod client;
mod types;

pub use client::{HttpClient, Network};
pub use types::{Headers, Request, Response};
