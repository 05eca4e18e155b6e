use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::{AuthFlow, AuthSession};
use crate::browser::{BrowserLauncher, BrowserSession, LaunchOptions};
use crate::config::{BackendKind, ResearchSite, ScraperConfig};
use crate::error::{Result, ScrapingError};
use crate::registry::{InstructionRegistry, SiteInstructionSet};
use crate::resolver::SelectorResolver;
use crate::scraper::ResearchScraper;

/// Overlays get a short look, they are usually either there or not.
const DISMISSAL_PROBE: Duration = Duration::from_secs(1);

/// DOM-driving scraper shared by the stealth and devtools backends; the
/// backends differ in launch profile and locator vocabulary only.
pub struct BrowserScraper {
    backend: BackendKind,
    config: Arc<ScraperConfig>,
    instructions: Arc<SiteInstructionSet>,
    launcher: Arc<dyn BrowserLauncher>,
    session: Option<Box<dyn BrowserSession>>,
    /// Set once the site URL has loaded in `session`.
    navigated: bool,
    two_factor_code: Option<String>,
}

impl BrowserScraper {
    pub fn new(
        backend: BackendKind,
        config: Arc<ScraperConfig>,
        registry: &InstructionRegistry,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Self> {
        if backend == BackendKind::Agent {
            return Err(ScrapingError::UnsupportedSite {
                site: config.site,
                backend,
            });
        }
        let instructions = registry.lookup(config.site, backend)?;
        let two_factor_code = config
            .credentials
            .as_ref()
            .and_then(|c| c.two_factor_code.clone());

        Ok(Self {
            backend,
            config,
            instructions,
            launcher,
            session: None,
            navigated: false,
            two_factor_code,
        })
    }

    fn active_session(&self) -> Result<&dyn BrowserSession> {
        self.session
            .as_deref()
            .ok_or_else(|| ScrapingError::Setup("browser session is not running".to_string()))
    }

    async fn dismiss_overlays(&self, session: &dyn BrowserSession) {
        for locator in &self.instructions.selectors.dismissals {
            let timeout = DISMISSAL_PROBE.min(self.config.probe_timeout);
            match session.find(locator, timeout).await {
                Ok(Some(element)) => {
                    debug!("Dismissing overlay {}", locator);
                    if let Err(e) = element.click().await {
                        debug!("Overlay {} did not take the click: {}", locator, e);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Overlay probe {} failed: {}", locator, e),
            }
        }
    }

    async fn submit_query(&self, session: &dyn BrowserSession, query: &str) -> Result<()> {
        let resolver = SelectorResolver::new(session);
        let input = resolver
            .resolve(
                "query input",
                &self.instructions.selectors.query_input,
                self.config.probe_timeout,
            )
            .await?;

        input.click().await?;
        input.fill(query).await?;
        input.press("Enter").await?;
        info!("Submitted research query ({} chars)", query.chars().count());
        Ok(())
    }

    /// Re-probes every response candidate each tick and returns the first
    /// non-empty text.
    async fn await_response(&self, session: &dyn BrowserSession) -> Result<String> {
        let waits = self.instructions.waits;
        let deadline = Instant::now() + waits.response;

        loop {
            for locator in &self.instructions.selectors.response_container {
                let element = match session.find(locator, Duration::ZERO).await {
                    Ok(Some(element)) => element,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!("Response probe {} failed: {}", locator, e);
                        continue;
                    }
                };
                match element.read_text().await {
                    Ok(text) if !text.trim().is_empty() => {
                        info!("Response found via {} ({} chars)", locator, text.len());
                        return Ok(text.trim().to_string());
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Could not read {}: {}", locator, e),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ScrapingError::ResponseTimeout {
                    waited: waits.response,
                });
            }
            tokio::time::sleep(waits.poll_interval.min(deadline - now)).await;
        }
    }
}

fn as_setup_error(err: ScrapingError) -> ScrapingError {
    match err {
        ScrapingError::Setup(_) => err,
        other => ScrapingError::Setup(other.to_string()),
    }
}

#[async_trait]
impl ResearchScraper for BrowserScraper {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn site(&self) -> ResearchSite {
        self.config.site
    }

    fn set_two_factor_code(&mut self, code: String) {
        self.two_factor_code = Some(code);
    }

    async fn setup(&mut self) -> Result<()> {
        if self.navigated {
            return Ok(());
        }

        if self.session.is_none() {
            let options = LaunchOptions::for_backend(self.backend, &self.config);
            let session = self.launcher.start(&options).await.map_err(as_setup_error)?;
            // owned before navigating so cleanup can release a half-set-up session
            self.session = Some(session);
        }

        let url = self.config.site_config().url;
        self.active_session()?
            .navigate(url)
            .await
            .map_err(as_setup_error)?;
        self.navigated = true;
        info!("{} backend ready on {}", self.backend, url);
        Ok(())
    }

    async fn login(&mut self) -> Result<bool> {
        let site = self.config.site_config();
        if !site.requires_auth {
            debug!("{} needs no login", self.config.site);
            return Ok(true);
        }

        let session = self.active_session()?;
        let credentials = self.config.credentials.as_ref().ok_or_else(|| {
            ScrapingError::Configuration(format!("{} requires credentials", self.config.site))
        })?;

        let flow = AuthFlow::new(
            session,
            site,
            &self.instructions,
            credentials,
            self.config.probe_timeout,
        );
        let mut auth = AuthSession::new(self.two_factor_code.clone());
        flow.run(&mut auth).await
    }

    async fn execute_research(&mut self, query: &str) -> Result<String> {
        let session = self.active_session()?;
        let waits = self.instructions.waits;

        tokio::time::sleep(waits.pre_input).await;
        self.dismiss_overlays(session).await;
        self.submit_query(session, query).await?;
        tokio::time::sleep(waits.post_input).await;

        self.await_response(session).await
    }

    async fn cleanup(&mut self) {
        self.navigated = false;
        let Some(session) = self.session.take() else {
            return;
        };
        if let Err(e) = session.close().await {
            warn!("Failed to close {} browser session: {}", self.backend, e);
        }
    }
}
