//! One scraping contract, several automation backends.

pub mod agent;
pub mod browser;


use async_trait::async_trait;

use crate::config::{BackendKind, ResearchSite};
use crate::error::Result;

pub use agent::{AgentRunner, AgentScraper, HttpAgentRunner};
pub use browser::BrowserScraper;

/// Operations every backend exposes. An instance owns its backend session
/// exclusively and runs one step at a time.
#[async_trait]
pub trait ResearchScraper: Send {
    fn backend(&self) -> BackendKind;

    fn site(&self) -> ResearchSite;

    /// Overrides the two-factor code used by the next login.
    fn set_two_factor_code(&mut self, code: String);

    /// Starts the backend and opens the site. Calling it again is a no-op.
    async fn setup(&mut self) -> Result<()>;

    /// `Ok(false)` means the login ran but success was never observed.
    async fn login(&mut self) -> Result<bool>;

    async fn execute_research(&mut self, query: &str) -> Result<String>;

    /// Releases the backend. Safe after a failed setup and safe to repeat.
    async fn cleanup(&mut self);
}
