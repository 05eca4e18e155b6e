//! Capability surface the scrapers drive, plus the chromiumoxide engine that
//! implements it.
//!
//! Scrapers only ever see [`BrowserLauncher`], [`BrowserSession`] and
//! [`PageElement`]; which engine sits behind them is a launch-time decision.

pub mod chrome;
pub mod locate;
pub mod stealth;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{AuthCookie, BackendKind, ScraperConfig, Viewport};
use crate::error::Result;
use crate::registry::Locator;

pub use chrome::{ChromeElement, ChromeLauncher, ChromeSession};
pub use stealth::{BrowserFingerprint, FingerprintRandomizer, StealthConfig, UserAgentGenerator};

/// A resolved element on the live page.
#[async_trait]
pub trait PageElement: Send + Sync {
    async fn click(&self) -> Result<()>;
    /// Replaces the element's current value with `text`.
    async fn fill(&self, text: &str) -> Result<()>;
    async fn press(&self, key: &str) -> Result<()>;
    /// Visible text, empty when the element has none yet.
    async fn read_text(&self) -> Result<String>;
}

/// One exclusively-owned browser session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    /// Waits up to `timeout` for `locator` to match. `Ok(None)` means no match;
    /// `Err` is reserved for engine failures.
    async fn find(&self, locator: &Locator, timeout: Duration) -> Result<Option<Box<dyn PageElement>>>;
    /// Releases the session. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn start(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>>;
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: Viewport,
    pub args: Vec<String>,
    pub stealth: Option<StealthConfig>,
    pub cookies: Vec<AuthCookie>,
    pub navigation_timeout: Duration,
}

impl LaunchOptions {
    pub fn for_backend(backend: BackendKind, config: &ScraperConfig) -> Self {
        let stealth = match backend {
            BackendKind::Stealth => Some(StealthConfig::default()),
            BackendKind::Devtools | BackendKind::Agent => None,
        };

        let mut args = match &stealth {
            Some(profile) => profile.launch_args(),
            None => vec!["--no-sandbox".to_string(), "--disable-dev-shm-usage".to_string()],
        };
        args.push(config.window_size_arg());

        // cookies only make sense where we also control fingerprinting
        let cookies = if stealth.is_some() {
            config.auth_cookies.clone()
        } else {
            Vec::new()
        };

        Self {
            headless: config.headless,
            viewport: config.viewport,
            args,
            stealth,
            cookies,
            navigation_timeout: config.navigation_timeout,
        }
    }
}
