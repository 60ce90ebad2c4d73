pub mod cache_store;
pub mod core;
pub mod exchange_client;

pub use cache_store::InMemoryCacheStore;
pub use exchange_client::BinanceExchangeClient;
