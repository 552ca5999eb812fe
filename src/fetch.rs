//! Page sources: a headless browser for the live dashboard and a plain HTTP client

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, instrument};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; CaseWatch/1.0)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to start async runtime")]
    Runtime(#[source] std::io::Error),

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to open {url}")]
    Navigate {
        url: String,
        #[source]
        source: CdpError,
    },

    #[error("no element matching {selector} on {url}")]
    ElementNotFound {
        selector: String,
        url: String,
        #[source]
        source: CdpError,
    },

    #[error("failed to click {selector}")]
    Interaction {
        selector: String,
        #[source]
        source: CdpError,
    },

    #[error("failed to read page content from {url}")]
    Content {
        url: String,
        #[source]
        source: CdpError,
    },

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("HTTP request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Something that can turn a URL into final page markup
pub trait PageSource {
    fn page_source(&self, url: &str) -> Result<String, FetchError>;
}

/// Drives headless Chrome so the collapsed case table gets expanded before the markup is read
pub struct BrowserPageSource {
    /// CSS selector of the element that reveals the table
    pub toggle_selector: String,
    pub chrome_executable: Option<String>,
}

impl BrowserPageSource {
    pub fn new(toggle_class: &str) -> Self {
        Self {
            toggle_selector: format!(".{}", toggle_class),
            chrome_executable: std::env::var("CHROME").ok(),
        }
    }

    fn config(&self) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder().arg("--incognito");
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(FetchError::Launch)
    }

    #[instrument(skip_all)]
    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let (mut browser, mut handler) = Browser::launch(self.config()?)
            .await
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.interact(&browser, url).await;

        if let Err(e) = browser.close().await {
            debug!(error = %e, "Browser did not close cleanly");
        }
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "Browser process did not exit cleanly");
        }
        events.abort();

        result
    }

    #[instrument(skip_all)]
    async fn interact(&self, browser: &Browser, url: &str) -> Result<String, FetchError> {
        let page = browser
            .new_page(url)
            .await
            .map_err(|source| FetchError::Navigate {
                url: url.to_string(),
                source,
            })?;
        info!(url, "Got the webpage");

        let toggle = page
            .find_element(self.toggle_selector.as_str())
            .await
            .map_err(|source| FetchError::ElementNotFound {
                selector: self.toggle_selector.clone(),
                url: url.to_string(),
                source,
            })?;
        toggle
            .click()
            .await
            .map_err(|source| FetchError::Interaction {
                selector: self.toggle_selector.clone(),
                source,
            })?;
        info!("Button clicked successfully");

        page.content().await.map_err(|source| FetchError::Content {
            url: url.to_string(),
            source,
        })
    }
}

impl PageSource for BrowserPageSource {
    #[instrument(skip_all)]
    fn page_source(&self, url: &str) -> Result<String, FetchError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(FetchError::Runtime)?;
        runtime.block_on(self.render(url))
    }
}

/// Plain GET; enough when the table is already in the static markup
pub struct HttpPageSource {
    client: reqwest::blocking::Client,
}

impl HttpPageSource {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl PageSource for HttpPageSource {
    #[instrument(skip_all)]
    fn page_source(&self, url: &str) -> Result<String, FetchError> {
        let http_err = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let text = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(http_err)?;
        info!(url, bytes = text.len(), "Got the webpage");
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Serves fixed markup, or fails like a dead browser would
    pub(crate) struct FixedPage(pub Option<String>);

    impl PageSource for FixedPage {
        fn page_source(&self, url: &str) -> Result<String, FetchError> {
            self.0
                .clone()
                .ok_or_else(|| FetchError::Launch(format!("no browser for {url}")))
        }
    }

    #[test]
    fn test_toggle_selector_from_class() {
        let source = BrowserPageSource::new("collapsible");
        assert_eq!(source.toggle_selector, ".collapsible");
    }

    #[test]
    fn test_http_source_reports_url_on_failure() {
        let source = HttpPageSource::new().unwrap();
        let err = source.page_source("http://127.0.0.1:9/").unwrap_err();
        assert!(err.to_string().contains("127.0.0.1:9"));
    }
}
