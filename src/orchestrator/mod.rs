//! Top-level entry point: pick a backend, run whole attempts, back off.


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::auth::AuthStep;
use crate::browser::{BrowserLauncher, ChromeLauncher};
use crate::config::{BackendKind, ResearchSite, ScraperConfig};
use crate::error::{Result, ScrapingError};
use crate::registry::InstructionRegistry;
use crate::scraper::{AgentRunner, AgentScraper, BrowserScraper, HttpAgentRunner, ResearchScraper};

/// Linear backoff: the pause after failed attempt `n` is `n * unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    unit: Duration,
}

impl BackoffPolicy {
    pub fn linear(unit: Duration) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }

    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        self.unit.saturating_mul(failed_attempt)
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Builds a fresh scraper for every attempt.
pub trait ScraperFactory: Send + Sync {
    fn create(&self, backend: BackendKind, config: Arc<ScraperConfig>) -> Result<Box<dyn ResearchScraper>>;
}

pub struct DefaultScraperFactory {
    registry: Arc<InstructionRegistry>,
    launcher: Arc<dyn BrowserLauncher>,
    agent_runner: Arc<dyn AgentRunner>,
}

impl DefaultScraperFactory {
    /// Built-in instruction table, Chromium and the HTTP agent runner.
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self::with_parts(
            Arc::new(InstructionRegistry::builtin()),
            Arc::new(ChromeLauncher::new()),
            Arc::new(HttpAgentRunner::new(config.agent.clone())?),
        ))
    }

    pub fn with_parts(
        registry: Arc<InstructionRegistry>,
        launcher: Arc<dyn BrowserLauncher>,
        agent_runner: Arc<dyn AgentRunner>,
    ) -> Self {
        Self {
            registry,
            launcher,
            agent_runner,
        }
    }
}

impl ScraperFactory for DefaultScraperFactory {
    fn create(&self, backend: BackendKind, config: Arc<ScraperConfig>) -> Result<Box<dyn ResearchScraper>> {
        match backend {
            BackendKind::Stealth | BackendKind::Devtools => Ok(Box::new(BrowserScraper::new(
                backend,
                config,
                &self.registry,
                self.launcher.clone(),
            )?)),
            BackendKind::Agent => Ok(Box::new(AgentScraper::new(
                config,
                &self.registry,
                self.agent_runner.clone(),
            )?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchRequest {
    pub query: String,
    pub site: ResearchSite,
    pub backend: BackendKind,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>, site: ResearchSite, backend: BackendKind) -> Self {
        Self {
            query: query.into(),
            site,
            backend,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchResult {
    pub text: String,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
    pub backend: BackendKind,
    pub site: ResearchSite,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

pub struct ResearchOrchestrator {
    config: ScraperConfig,
    factory: Arc<dyn ScraperFactory>,
    backoff: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
    two_factor_code: Option<String>,
}

impl ResearchOrchestrator {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let factory = Arc::new(DefaultScraperFactory::new(&config)?);
        Ok(Self::with_factory(config, factory))
    }

    pub fn with_factory(config: ScraperConfig, factory: Arc<dyn ScraperFactory>) -> Self {
        Self {
            backoff: BackoffPolicy::linear(config.backoff_unit),
            config,
            factory,
            sleeper: Arc::new(TokioSleeper),
            two_factor_code: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Code handed to every attempt's login, overriding the configured one.
    pub fn with_two_factor_code(mut self, code: impl Into<String>) -> Self {
        self.two_factor_code = Some(code.into());
        self
    }

    /// Runs up to `max_retries` complete attempts. The last attempt's error
    /// is returned unchanged; configuration and unsupported-site errors stop
    /// the loop at once.
    ///
    /// The attempt count is part of [`ResearchResult`] on success. On
    /// failure it is only reported through the `attempts` field of the final
    /// `error!` event.
    pub async fn research(&self, request: &ResearchRequest) -> Result<ResearchResult> {
        let config = if request.site == self.config.site {
            self.config.clone()
        } else {
            self.config.clone().with_site(request.site)?
        };
        let config = Arc::new(config);
        let max_attempts = config.max_retries.max(1);
        let started = Instant::now();

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(
                "Research attempt {}/{} on {} via {} backend",
                attempt, max_attempts, request.site, request.backend
            );

            match self.run_attempt(request, config.clone()).await {
                Ok(text) => {
                    info!("Research finished after {} attempt(s)", attempt);
                    return Ok(ResearchResult {
                        text,
                        attempts: attempt,
                        backend: request.backend,
                        site: request.site,
                        elapsed: started.elapsed(),
                        completed_at: Utc::now(),
                    });
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        attempts = attempt,
                        site = %request.site,
                        backend = %request.backend,
                        "Research aborted: {}",
                        e
                    );
                    return Err(e);
                }
                Err(e) if attempt >= max_attempts => {
                    error!(
                        attempts = attempt,
                        site = %request.site,
                        backend = %request.backend,
                        "Research failed after {} attempts: {}",
                        attempt,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.backoff.delay_for(attempt);
                    warn!("Attempt {} failed: {}. Retrying in {:?}", attempt, e, delay);
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }

    /// One `setup → login → execute → cleanup` pass on a new scraper.
    /// Cleanup runs on every exit path once the scraper exists.
    async fn run_attempt(&self, request: &ResearchRequest, config: Arc<ScraperConfig>) -> Result<String> {
        let mut scraper = self.factory.create(request.backend, config)?;
        if let Some(code) = &self.two_factor_code {
            scraper.set_two_factor_code(code.clone());
        }

        let outcome = Self::drive(scraper.as_mut(), &request.query).await;
        scraper.cleanup().await;
        outcome
    }

    async fn drive(scraper: &mut dyn ResearchScraper, query: &str) -> Result<String> {
        scraper.setup().await?;
        if !scraper.login().await? {
            return Err(ScrapingError::authentication(
                AuthStep::VerifyingSuccess,
                "login did not reach the signed-in page",
            ));
        }
        scraper.execute_research(query).await
    }
}

/// One-shot convenience over [`ResearchOrchestrator`] with the default
/// backends.
pub async fn research(
    query: &str,
    backend: BackendKind,
    site: ResearchSite,
    config: ScraperConfig,
) -> Result<String> {
    let orchestrator = ResearchOrchestrator::new(config)?;
    let request = ResearchRequest::new(query, site, backend);
    Ok(orchestrator.research(&request).await?.text)
}
