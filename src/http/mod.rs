//! HTTP layer: Envirofacts client, retry logic and the transport seam.

pub(crate) mod client;
pub(crate) mod retry;
pub mod transport;

pub use client::{Page, TriApiClient};
pub use retry::{classify_response, with_retry};
pub use transport::{HttpResponse, ReqwestTransport, Transport};
