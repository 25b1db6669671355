//! Outbound push delivery.
//!
//! One call delivers one payload to one recipient. Pacing, batching and
//! timestamp bookkeeping live in `herald-engine`; this crate only knows how
//! to talk to the delivery endpoint.

pub mod http;
pub mod transport;

pub use http::HttpTransport;
pub use transport::{DeliveryFailed, NotificationTransport};
