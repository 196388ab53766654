mod client;
mod pacer;
mod transport;

pub use client::ForumClient;
pub use pacer::Pacer;
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};
