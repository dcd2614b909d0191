use chrono::NaiveDate;
use log::{error, info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::artifacts::ArtifactLayout;
use crate::browser::Browser;
use crate::config::{ScrapeConfig, SettleConfig};
use crate::error::{BrowserError, FetchError};
use crate::model::{ChannelGroup, PairKey};

/// How to wait for a page after navigating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settle {
    Delay(Duration),
    WaitFor { selector: String, timeout: Duration },
}

impl From<&SettleConfig> for Settle {
    fn from(config: &SettleConfig) -> Self {
        match config {
            SettleConfig::Delay { secs } => Settle::Delay(Duration::from_secs(*secs)),
            SettleConfig::WaitFor {
                selector,
                timeout_secs,
            } => Settle::WaitFor {
                selector: selector.clone(),
                timeout: Duration::from_secs(*timeout_secs),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_attempts: u32,
    /// Attempt N is followed by a wait of N times this
    pub backoff_base: Duration,
    pub settle: Settle,
}

impl FetchPolicy {
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
            settle: Settle::from(&config.settle),
        }
    }

    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

#[derive(Debug)]
pub struct FetchedPage {
    pub url: String,
    pub markup: String,
    /// Where the markup was stored
    pub artifact: PathBuf,
    pub attempts: u32,
}

/// Retrieves one guide page per (channel group, date) with bounded retries
pub struct PageFetcher<'a> {
    policy: FetchPolicy,
    layout: &'a ArtifactLayout,
}

impl<'a> PageFetcher<'a> {
    pub fn new(policy: FetchPolicy, layout: &'a ArtifactLayout) -> Self {
        Self { policy, layout }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetch the page and store its markup
    ///
    /// Transient errors are retried up to `max_attempts` times; an
    /// unclassified error ends the pair at once. Nothing is written unless
    /// an attempt succeeds.
    pub fn fetch(
        &self,
        browser: &mut dyn Browser,
        group: &ChannelGroup,
        date: NaiveDate,
    ) -> Result<FetchedPage, FetchError> {
        let url = group.url_for(date);
        let key = PairKey::new(group.key.clone(), date);
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            info!("[{}] attempt {}: {}", key, attempt, url);
            match self.attempt(browser, &url) {
                Ok(markup) => {
                    let artifact = self.layout.write_markup(&key, &markup)?;
                    info!("[{}] saved markup to {}", key, artifact.display());
                    return Ok(FetchedPage {
                        url,
                        markup,
                        artifact,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_transient() => {
                    warn!("[{}] attempt {} failed: {}", key, attempt, e);
                    last_error = Some(e);
                    if attempt < self.policy.max_attempts {
                        thread::sleep(self.policy.backoff(attempt));
                    }
                }
                Err(e) => {
                    error!("[{}] giving up: {}", key, e);
                    return Err(FetchError::Fatal { url, source: e });
                }
            }
        }

        Err(FetchError::Exhausted {
            url,
            attempts: self.policy.max_attempts,
            last: last_error
                .unwrap_or_else(|| BrowserError::Unclassified("no attempt made".to_string())),
        })
    }

    fn attempt(&self, browser: &mut dyn Browser, url: &str) -> Result<String, BrowserError> {
        browser.navigate(url)?;
        match &self.policy.settle {
            Settle::Delay(delay) => thread::sleep(*delay),
            Settle::WaitFor { selector, timeout } => {
                if !browser.wait_for(selector, *timeout)? {
                    return Err(BrowserError::RenderTimeout(format!(
                        "'{}' did not appear within {}s",
                        selector,
                        timeout.as_secs()
                    )));
                }
            }
        }
        browser.page_source()
    }
}
