pub mod auth;
pub mod browser;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod scraper;

#[cfg(test)]
mod testing;

pub use error::{Result, ScrapingError};
pub use config::{BackendKind, ResearchSite, ScraperConfig};
pub use orchestrator::{research, ResearchOrchestrator, ResearchRequest, ResearchResult};
pub use registry::InstructionRegistry;
pub use scraper::ResearchScraper;
