use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::config::{AgentSettings, BackendKind, ResearchSite, ScraperConfig};
use crate::error::{Result, ScrapingError};
use crate::registry::{AgentTaskTemplate, InstructionRegistry, SiteInstructionSet};
use crate::scraper::ResearchScraper;

/// An autonomous browsing agent: takes a natural-language task, returns the
/// text it extracted. How it gets there is its own business.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_agent_task(&self, task: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct AgentTaskRequest<'a> {
    task: &'a str,
    max_steps: u32,
}

#[derive(Debug, Deserialize)]
struct AgentTaskResponse {
    #[serde(default)]
    final_result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Talks to an agent service over HTTP: `POST {task, max_steps}`, read
/// `final_result`.
pub struct HttpAgentRunner {
    client: Client,
    settings: AgentSettings,
}

impl HttpAgentRunner {
    pub fn new(settings: AgentSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.task_timeout)
            .build()
            .map_err(|e| ScrapingError::Setup(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }
}

#[async_trait]
impl AgentRunner for HttpAgentRunner {
    async fn run_agent_task(&self, task: &str) -> Result<String> {
        let payload = AgentTaskRequest {
            task,
            max_steps: self.settings.max_steps,
        };

        let mut request = self.client.post(&self.settings.endpoint).json(&payload);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        debug!("Dispatching agent task to {}", self.settings.endpoint);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(ScrapingError::ResponseTimeout {
                    waited: self.settings.task_timeout,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapingError::Agent(format!(
                "agent service returned {}: {}",
                status, body
            )));
        }

        let body: AgentTaskResponse = response.json().await?;
        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(ScrapingError::Agent(error));
        }
        Ok(body.final_result.unwrap_or_default())
    }
}

/// Backend that hands the whole sequence to an agent. Login is folded into
/// the task text, so there is no separate login round-trip.
pub struct AgentScraper {
    config: Arc<ScraperConfig>,
    instructions: Arc<SiteInstructionSet>,
    runner: Arc<dyn AgentRunner>,
    two_factor_code: Option<String>,
    ready: bool,
}

impl AgentScraper {
    pub fn new(
        config: Arc<ScraperConfig>,
        registry: &InstructionRegistry,
        runner: Arc<dyn AgentRunner>,
    ) -> Result<Self> {
        let instructions = registry.lookup(config.site, BackendKind::Agent)?;
        let two_factor_code = config
            .credentials
            .as_ref()
            .and_then(|c| c.two_factor_code.clone());

        Ok(Self {
            config,
            instructions,
            runner,
            two_factor_code,
            ready: false,
        })
    }

    fn template(&self) -> Result<&AgentTaskTemplate> {
        self.instructions.agent_task.as_ref().ok_or_else(|| {
            ScrapingError::Configuration(format!("no agent task template for {}", self.config.site))
        })
    }

    /// The task text. Contains credentials, never log it.
    pub fn render_task(&self, query: &str) -> Result<String> {
        let site = self.config.site_config();
        let login = if site.requires_auth {
            self.config
                .credentials
                .as_ref()
                .map(|c| (c.email.as_str(), c.password.as_str()))
        } else {
            None
        };

        let selectors = &self.instructions.selectors;
        let mut task = self.template()?.render(site.url, query, login, selectors);
        if let (true, Some(code)) = (site.requires_auth, &self.two_factor_code) {
            let field = selectors
                .describe("two_factor_input")
                .unwrap_or_else(|| "the verification code field".to_string());
            task.push_str(&format!("\nIf asked for a verification code, enter '{}' in {}", code, field));
        }
        Ok(task)
    }
}

#[async_trait]
impl ResearchScraper for AgentScraper {
    fn backend(&self) -> BackendKind {
        BackendKind::Agent
    }

    fn site(&self) -> ResearchSite {
        self.config.site
    }

    fn set_two_factor_code(&mut self, code: String) {
        self.two_factor_code = Some(code);
    }

    async fn setup(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }
        self.template().map_err(|e| ScrapingError::Setup(e.to_string()))?;
        self.ready = true;
        Ok(())
    }

    async fn login(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn execute_research(&mut self, query: &str) -> Result<String> {
        if !self.ready {
            return Err(ScrapingError::Setup("agent backend is not set up".to_string()));
        }

        let task = self.render_task(query)?;
        info!(
            "Running agent task for {} (max {} steps)",
            self.config.site, self.config.agent.max_steps
        );

        let result = tokio::time::timeout(self.config.agent.task_timeout, self.runner.run_agent_task(&task))
            .await
            .map_err(|_| ScrapingError::ResponseTimeout {
                waited: self.config.agent.task_timeout,
            })??;

        let text = result.trim();
        if text.is_empty() {
            return Err(ScrapingError::ResponseTimeout {
                waited: self.config.agent.task_timeout,
            });
        }
        info!("Agent returned {} chars", text.len());
        Ok(text.to_string())
    }

    async fn cleanup(&mut self) {
        self.ready = false;
    }
}
