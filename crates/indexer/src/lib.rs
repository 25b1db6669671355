pub mod chain;
pub mod ingestor;

pub use chain::{AlloyChainClient, ChainClient};
pub use ingestor::{EventIngestor, IngestorHealth, ReconnectPolicy};
