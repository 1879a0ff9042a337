use crate::error::{FetchError, Result};
use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Issues one GET per page and hands back the raw body.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        proxy: Option<&ProxyEndpoint>,
        user_agent: &str,
    ) -> Result<String>;
}

/// `{base}/members/{handle}/followers?limit={limit}&offset={offset}`
pub fn followers_url(base: &str, root_handle: &str, offset: u64, limit: u32) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| FetchError::InvalidUrl(format!("Invalid base URL '{}': {}", base, e)))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(format!("'{}' cannot be a base URL", base)))?;
        segments
            .pop_if_empty()
            .push("members")
            .push(root_handle)
            .push("followers");
    }

    url.query_pairs_mut()
        .clear()
        .append_pair("limit", &limit.to_string())
        .append_pair("offset", &offset.to_string());

    Ok(url)
}

pub struct HttpPageFetcher {
    client: Client,
    proxied_clients: Mutex<HashMap<ProxyEndpoint, Client>>,
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, None)?,
            proxied_clients: Mutex::new(HashMap::new()),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client_for(&self, proxy: &ProxyEndpoint) -> Result<Client> {
        let mut clients = self
            .proxied_clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        let client = build_client(self.timeout, Some(proxy))?;
        clients.insert(proxy.clone(), client.clone());
        Ok(client)
    }
}

fn build_client(timeout: Duration, proxy: Option<&ProxyEndpoint>) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout / 2)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::limited(5));

    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy.to_string())
            .map_err(|e| FetchError::ClientBuild(format!("Invalid proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|e| FetchError::ClientBuild(e.to_string()))
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(
        &self,
        url: &Url,
        proxy: Option<&ProxyEndpoint>,
        user_agent: &str,
    ) -> Result<String> {
        let client = match proxy {
            Some(proxy) => self.client_for(proxy)?,
            None => self.client.clone(),
        };

        debug!(
            "Fetching {} via {}",
            url,
            proxy.map(|p| p.to_string()).unwrap_or_else(|| "local address".to_string())
        );

        let start = Instant::now();
        let response = client
            .get(url.clone())
            .header(USER_AGENT, user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!(
            "Fetched {} ({} bytes) in {:?}",
            url,
            body.len(),
            start.elapsed()
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    #[test]
    fn test_followers_url_shape() {
        let url = followers_url("https://www.zhihu.com/api/v4", "alice", 40, 20).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.zhihu.com/api/v4/members/alice/followers?limit=20&offset=40"
        );
    }

    #[test]
    fn test_followers_url_trailing_slash_base() {
        let url = followers_url("http://localhost:8080/api/", "bob", 0, 10).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/members/bob/followers?limit=10&offset=0"
        );
    }

    #[test]
    fn test_followers_url_encodes_handle() {
        let url = followers_url("http://localhost", "a b/c", 0, 20).unwrap();
        assert!(url.path().contains("a%20b%2Fc"));
    }

    #[test]
    fn test_followers_url_invalid_base() {
        assert!(matches!(
            followers_url("not a url", "alice", 0, 20),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            followers_url("mailto:someone@example.com", "alice", 0, 20),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_sends_user_agent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/members/alice/followers"))
            .and(query_param("limit", "20"))
            .and(query_param("offset", "0"))
            .and(header("user-agent", "test-agent/1.0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(r#"{"paging":{"totals":0},"data":[]}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = HttpPageFetcher::new().unwrap();
        let url = followers_url(&mock_server.uri(), "alice", 0, 20).unwrap();
        let body = fetcher.fetch(&url, None, "test-agent/1.0").await.unwrap();

        assert_eq!(body, r#"{"paging":{"totals":0},"data":[]}"#);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let fetcher = HttpPageFetcher::new().unwrap();
        let url = followers_url(&mock_server.uri(), "alice", 0, 20).unwrap();
        let err = fetcher.fetch(&url, None, "agent").await.unwrap_err();

        match err {
            FetchError::Status { status, url } => {
                assert_eq!(status, 403);
                assert!(url.contains("/members/alice/followers"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let fetcher = HttpPageFetcher::with_timeout(Duration::from_millis(100)).unwrap();
        let url = followers_url(&mock_server.uri(), "alice", 0, 20).unwrap();
        let err = fetcher.fetch(&url, None, "agent").await.unwrap_err();

        assert!(matches!(err, FetchError::Http(_)));
    }

    #[test]
    fn test_proxied_clients_are_cached() {
        let fetcher = HttpPageFetcher::new().unwrap();
        let proxy = ProxyEndpoint::parse("127.0.0.1:3128").unwrap();

        fetcher.client_for(&proxy).unwrap();
        fetcher.client_for(&proxy).unwrap();

        assert_eq!(fetcher.proxied_clients.lock().unwrap().len(), 1);
    }
}
