pub mod agent;
pub mod error;
pub mod fetcher;
pub mod proxy;

pub use agent::{UserAgentProvider, UserAgentRotation};
pub use error::FetchError;
pub use fetcher::{HttpPageFetcher, PageFetcher, followers_url};
pub use proxy::{NoProxy, ProxyEndpoint, ProxyFallback, ProxyPool, ProxyProvider, ProxyScheme};
