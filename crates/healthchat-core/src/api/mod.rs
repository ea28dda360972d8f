//! Typed bindings for the remote API, routed through the local proxy.

mod cache;
mod client;
mod endpoint;

pub use cache::{QueryCache, QueryKey};
pub use client::ApiClient;
pub use endpoint::{Endpoint, EndpointSpec, MethodKind, Tag};
