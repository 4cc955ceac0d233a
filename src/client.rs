use std::time::Duration;

use log::debug;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use crate::config::ExtractConfig;
use crate::error::{Error, Result};
use crate::params::QueryParams;
use crate::streams::StreamKind;

/// The outbound HTTP seam. The run loop only depends on this trait, so tests
/// drive it with canned bodies instead of a live endpoint.
pub trait Fetch {
    /// Perform one GET and return the raw response body.
    fn fetch(&self, kind: StreamKind, params: &QueryParams) -> Result<String>;
}

/// Blocking HTTP client for the Open-Meteo API.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    http: HttpClient,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let user_agent = config.user_agent.clone().unwrap_or_else(|| {
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        });
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|_| Error::InvalidConfig(format!("invalid user agent: {user_agent}")))?,
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
        })
    }

    /// Full request URL: base + stream path + encoded parameter set.
    pub fn request_url(&self, kind: StreamKind, params: &QueryParams) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, kind.path()))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params.encoded_pairs() {
                pairs.append_pair(key, &value);
            }
        }
        Ok(url)
    }
}

impl Fetch for OpenMeteoClient {
    fn fetch(&self, kind: StreamKind, params: &QueryParams) -> Result<String> {
        let url = self.request_url(kind, params)?;
        debug!("GET {url}");
        let body = self.http.get(url).send()?.error_for_status()?.text()?;
        Ok(body)
    }
}
