pub mod client;
pub mod strategy;
pub mod transport;
mod wire;

pub use client::GitLabClient;
pub use transport::{ReqwestTransport, Transport};
