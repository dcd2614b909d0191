//! Browser-automation collaborator
//!
//! The fetcher only needs three things from a browser: navigate, report the
//! rendered document, and optionally wait for a selector. `HttpBrowser` covers
//! the guide pages that render server-side; anything driving a real browser
//! plugs in through the same trait.

use log::debug;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::error::BrowserError;

pub trait Browser {
    /// Load `url`, replacing the current document
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Markup of the current document
    fn page_source(&mut self) -> Result<String, BrowserError>;

    /// Wait up to `timeout` for `selector` to match; `Ok(false)` when it never did
    fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool, BrowserError>;

    /// Release the underlying driver
    fn quit(&mut self) {}
}

/// Scoped ownership of a browser; `quit` runs on every exit path
pub struct BrowserSession<B: Browser> {
    browser: B,
}

impl<B: Browser> BrowserSession<B> {
    pub fn new(browser: B) -> Self {
        Self { browser }
    }
}

impl<B: Browser> Deref for BrowserSession<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.browser
    }
}

impl<B: Browser> DerefMut for BrowserSession<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.browser
    }
}

impl<B: Browser> Drop for BrowserSession<B> {
    fn drop(&mut self) {
        self.browser.quit();
    }
}

/// Plain HTTP "browser" backed by a blocking reqwest client
pub struct HttpBrowser {
    client: Client,
    document: Option<String>,
}

impl HttpBrowser {
    pub fn new(request_timeout: Duration) -> Result<Self, BrowserError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("epg_scrape/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BrowserError::Unclassified(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            document: None,
        })
    }
}

fn classify_request_error(err: reqwest::Error) -> BrowserError {
    if err.is_timeout() {
        BrowserError::RenderTimeout(err.to_string())
    } else if err.is_connect() || err.is_request() || err.is_body() {
        BrowserError::Navigation(err.to_string())
    } else {
        BrowserError::Unclassified(err.to_string())
    }
}

fn classify_status(status: StatusCode, url: &str) -> Option<BrowserError> {
    if status.is_success() {
        None
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Some(BrowserError::Navigation(format!("HTTP {} from {}", status, url)))
    } else {
        Some(BrowserError::Unclassified(format!("HTTP {} from {}", status, url)))
    }
}

impl Browser for HttpBrowser {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.document = None;
        let response = self.client.get(url).send().map_err(classify_request_error)?;
        if let Some(err) = classify_status(response.status(), url) {
            return Err(err);
        }
        let body = response.text().map_err(classify_request_error)?;
        debug!("Loaded {} ({} bytes)", url, body.len());
        self.document = Some(body);
        Ok(())
    }

    fn page_source(&mut self) -> Result<String, BrowserError> {
        self.document
            .clone()
            .ok_or_else(|| BrowserError::Unclassified("no document loaded".to_string()))
    }

    fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<bool, BrowserError> {
        // A fetched document never changes, so one check is final
        let document = self
            .document
            .as_deref()
            .ok_or_else(|| BrowserError::Unclassified("no document loaded".to_string()))?;
        let selector = Selector::parse(selector)
            .map_err(|e| BrowserError::Unclassified(format!("invalid selector: {:?}", e)))?;
        Ok(Html::parse_document(document).select(&selector).next().is_some())
    }

    fn quit(&mut self) {
        self.document = None;
        debug!("HTTP browser closed");
    }
}
