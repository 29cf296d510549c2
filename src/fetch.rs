use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::config::SourceConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
}

/// A missing page is an answer, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Document(String),
    NotFound,
}

/// Where documents come from. Implemented over HTTP by [`Fetcher`].
pub trait Source: Sync {
    fn document_url(&self, name: &str) -> String;

    fn fetch_page(&self, url: &str) -> Result<Fetched, FetchError>;

    fn fetch_document(&self, name: &str) -> Result<Fetched, FetchError> {
        self.fetch_page(&self.document_url(name))
    }
}

/// `<base>/<name with spaces as underscores>`
pub fn document_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name.replace(' ', "_"))
}

/// Single-attempt blocking GET; no retries.
pub struct Fetcher {
    client: Client,
    base_url: String,
}

impl Fetcher {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(source.user_agent.as_str())
            .timeout(source.timeout())
            .build()?;
        Ok(Fetcher {
            client,
            base_url: source.base_url.clone(),
        })
    }
}

impl Source for Fetcher {
    fn document_url(&self, name: &str) -> String {
        document_url(&self.base_url, name)
    }

    fn fetch_page(&self, url: &str) -> Result<Fetched, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        debug!(%url, %status, "fetched");

        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(Fetched::Document(response.text().map_err(transport)?))
    }
}
