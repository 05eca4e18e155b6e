use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapingError};

/// Chat-style research sites the scraper knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchSite {
    Gemini,
    Perplexity,
}

impl ResearchSite {
    pub const ALL: [ResearchSite; 2] = [ResearchSite::Gemini, ResearchSite::Perplexity];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchSite::Gemini => "gemini",
            ResearchSite::Perplexity => "perplexity",
        }
    }
}

impl fmt::Display for ResearchSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResearchSite {
    type Err = ScrapingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(ResearchSite::Gemini),
            "perplexity" => Ok(ResearchSite::Perplexity),
            other => Err(ScrapingError::Configuration(format!(
                "Unknown research site '{}', expected one of: gemini, perplexity",
                other
            ))),
        }
    }
}

/// Automation backend used to drive a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Chromium with the anti-detection launch profile and precise CSS locators.
    Stealth,
    /// Plain devtools-protocol driving with fuzzy text locators.
    Devtools,
    /// Autonomous agent fed a natural-language task.
    Agent,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Stealth, BackendKind::Devtools, BackendKind::Agent];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Stealth => "stealth",
            BackendKind::Devtools => "devtools",
            BackendKind::Agent => "agent",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ScrapingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stealth" => Ok(BackendKind::Stealth),
            "devtools" => Ok(BackendKind::Devtools),
            "agent" => Ok(BackendKind::Agent),
            other => Err(ScrapingError::Configuration(format!(
                "Unknown backend '{}', expected one of: stealth, devtools, agent",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    None,
    Google,
}

/// Static description of a supported site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub url: &'static str,
    pub login_url: Option<&'static str>,
    pub requires_auth: bool,
    pub auth_kind: AuthKind,
}

const GEMINI_SITE: SiteConfig = SiteConfig {
    url: "https://gemini.google.com/app",
    login_url: Some("https://accounts.google.com"),
    requires_auth: true,
    auth_kind: AuthKind::Google,
};

const PERPLEXITY_SITE: SiteConfig = SiteConfig {
    url: "https://www.perplexity.ai",
    login_url: None,
    requires_auth: false,
    auth_kind: AuthKind::None,
};

pub fn site_config(site: ResearchSite) -> &'static SiteConfig {
    match site {
        ResearchSite::Gemini => &GEMINI_SITE,
        ResearchSite::Perplexity => &PERPLEXITY_SITE,
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub two_factor_code: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("two_factor_code", &self.two_factor_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub max_steps: u32,
    #[serde(with = "humantime_serde")]
    pub task_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8765/run".to_string(),
            api_key: None,
            max_steps: 5,
            task_timeout: Duration::from_secs(300),
        }
    }
}

/// Runtime configuration shared read-only by every scraper instance.
///
/// Build it through [`ScraperConfig::new`] (or [`AppConfig::into_scraper_config`]):
/// construction fails before any backend is touched when the site needs
/// credentials and they are missing.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub headless: bool,
    pub viewport: Viewport,
    /// Budget for a single locator candidate probe.
    pub probe_timeout: Duration,
    pub navigation_timeout: Duration,
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub site: ResearchSite,
    pub credentials: Option<Credentials>,
    pub auth_cookies: Vec<AuthCookie>,
    pub agent: AgentSettings,
}

impl ScraperConfig {
    pub fn new(site: ResearchSite, credentials: Option<Credentials>) -> Result<Self> {
        let config = Self {
            headless: true,
            viewport: Viewport::default(),
            probe_timeout: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            site,
            credentials,
            auth_cookies: Vec::new(),
            agent: AgentSettings::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-targets the config at another site, re-running the credential check.
    pub fn with_site(mut self, site: ResearchSite) -> Result<Self> {
        self.site = site;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.site_config().requires_auth {
            let complete = self
                .credentials
                .as_ref()
                .map(|c| !c.email.trim().is_empty() && !c.password.is_empty())
                .unwrap_or(false);
            if !complete {
                return Err(ScrapingError::Configuration(format!(
                    "{} requires an email and password",
                    self.site
                )));
            }
        }

        if self.max_retries == 0 {
            return Err(ScrapingError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(ScrapingError::Configuration(
                "probe_timeout must be greater than zero".to_string(),
            ));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ScrapingError::Configuration(
                "viewport dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn site_config(&self) -> &'static SiteConfig {
        site_config(self.site)
    }

    pub fn window_size_arg(&self) -> String {
        format!("--window-size={},{}", self.viewport.width, self.viewport.height)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserSettings {
    pub headless: bool,
    pub viewport: Viewport,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResearchSettings {
    pub site: ResearchSite,
    pub backend: BackendKind,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub backoff_unit: Duration,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialSettings {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub two_factor_code: Option<String>,
}

/// On-disk configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub browser: BrowserSettings,
    pub research: ResearchSettings,
    #[serde(default)]
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub cookies: Vec<AuthCookie>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            browser: BrowserSettings {
                headless: true,
                viewport: Viewport::default(),
                probe_timeout: Duration::from_secs(5),
                navigation_timeout: Duration::from_secs(30),
            },
            research: ResearchSettings {
                site: ResearchSite::Gemini,
                backend: BackendKind::Stealth,
                max_retries: 3,
                backoff_unit: Duration::from_secs(1),
            },
            credentials: CredentialSettings::default(),
            agent: AgentSettings::default(),
            cookies: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn into_scraper_config(self) -> Result<ScraperConfig> {
        let credentials = match (self.credentials.email, self.credentials.password) {
            (Some(email), Some(password)) => Some(Credentials {
                email,
                password,
                two_factor_code: self.credentials.two_factor_code,
            }),
            _ => None,
        };

        let config = ScraperConfig {
            headless: self.browser.headless,
            viewport: self.browser.viewport,
            probe_timeout: self.browser.probe_timeout,
            navigation_timeout: self.browser.navigation_timeout,
            max_retries: self.research.max_retries,
            backoff_unit: self.research.backoff_unit,
            site: self.research.site,
            credentials,
            auth_cookies: self.cookies,
            agent: self.agent,
        };
        config.validate()?;
        Ok(config)
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<AppConfig>;
    async fn save_config(&self, config: &AppConfig) -> Result<()>;
    fn validate_config(&self, config: &AppConfig) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
    env_prefix: String,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            env_prefix: "RESEARCH".to_string(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<AppConfig> {
        info!("Loading configuration from {:?}", self.config_path);

        // check if config file exists, create default if not
        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::from(self.config_path.as_path()).format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = layered.try_deserialize()?;
        Self::apply_credential_env(&mut app_config);

        self.validate_config(&app_config)?;

        info!("Configuration loaded successfully");
        Ok(app_config)
    }

    fn validate_config(&self, config: &AppConfig) -> Result<()> {
        debug!("Validating configuration");

        if config.research.max_retries == 0 {
            return Err(ScrapingError::Configuration("max_retries must be greater than 0".to_string()));
        }
        if config.research.max_retries > 10 {
            return Err(ScrapingError::Configuration("max_retries cannot exceed 10".to_string()));
        }
        if config.research.backoff_unit > Duration::from_secs(60) {
            return Err(ScrapingError::Configuration("backoff_unit cannot exceed 60 seconds".to_string()));
        }
        if config.browser.probe_timeout.is_zero() {
            return Err(ScrapingError::Configuration("probe_timeout must be greater than 0".to_string()));
        }
        if config.browser.viewport.width == 0 || config.browser.viewport.height == 0 {
            return Err(ScrapingError::Configuration("viewport dimensions must be non-zero".to_string()));
        }

        if config.research.backend == BackendKind::Agent {
            let endpoint = &config.agent.endpoint;
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ScrapingError::Configuration(
                    "agent.endpoint must start with http:// or https://".to_string(),
                ));
            }
            if config.agent.max_steps == 0 {
                return Err(ScrapingError::Configuration("agent.max_steps must be greater than 0".to_string()));
            }
        }

        for cookie in &config.cookies {
            if cookie.name.trim().is_empty() || cookie.domain.trim().is_empty() {
                return Err(ScrapingError::Configuration(format!(
                    "cookie entries need a name and a domain (got '{}' for '{}')",
                    cookie.name, cookie.domain
                )));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &AppConfig) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| ScrapingError::Configuration(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScrapingError::Configuration(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    /// Create a default configuration file
    pub async fn create_default_config(&self) -> Result<()> {
        let default_config = AppConfig::default();
        let toml_content = toml::to_string_pretty(&default_config)
            .map_err(|e| ScrapingError::Configuration(format!("Failed to serialize default config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| ScrapingError::Configuration(format!("Failed to create config directory: {}", e)))?;
            }
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScrapingError::Configuration(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }

    /// Google credentials may come from the conventional variables instead of the file.
    fn apply_credential_env(config: &mut AppConfig) {
        let fill = |slot: &mut Option<String>, var: &str| {
            if slot.as_deref().map(str::is_empty).unwrap_or(true) {
                if let Ok(value) = std::env::var(var) {
                    if !value.is_empty() {
                        debug!("Using {} from environment", var);
                        *slot = Some(value);
                    }
                }
            }
        };
        fill(&mut config.credentials.email, "GOOGLE_EMAIL");
        fill(&mut config.credentials.password, "GOOGLE_PASSWORD");
        fill(&mut config.credentials.two_factor_code, "GOOGLE_2FA_CODE");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn credentials(password: &str) -> Credentials {
        Credentials {
            email: "researcher@example.com".to_string(),
            password: password.to_string(),
            two_factor_code: None,
        }
    }

    #[test]
    fn test_site_table() {
        let gemini = site_config(ResearchSite::Gemini);
        assert!(gemini.requires_auth);
        assert_eq!(gemini.login_url, Some("https://accounts.google.com"));
        assert_eq!(gemini.auth_kind, AuthKind::Google);

        let perplexity = site_config(ResearchSite::Perplexity);
        assert!(!perplexity.requires_auth);
        assert!(perplexity.login_url.is_none());
    }

    #[test]
    fn test_auth_site_requires_credentials() {
        let err = ScraperConfig::new(ResearchSite::Gemini, None).unwrap_err();
        assert!(matches!(err, ScrapingError::Configuration(_)));

        let err = ScraperConfig::new(ResearchSite::Gemini, Some(credentials(""))).unwrap_err();
        assert!(matches!(err, ScrapingError::Configuration(_)));

        assert!(ScraperConfig::new(ResearchSite::Gemini, Some(credentials("hunter2"))).is_ok());
    }

    #[test]
    fn test_open_site_needs_no_credentials() {
        let config = ScraperConfig::new(ResearchSite::Perplexity, None).unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.window_size_arg(), "--window-size=1920,1080");

        // switching to an authenticated site re-runs the check
        assert!(config.with_site(ResearchSite::Gemini).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let mut creds = credentials("hunter2");
        creds.two_factor_code = Some("123456".to_string());
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("123456"));
        assert!(rendered.contains("researcher@example.com"));
    }

    #[test]
    fn test_parse_site_and_backend() {
        assert_eq!("Gemini".parse::<ResearchSite>().unwrap(), ResearchSite::Gemini);
        assert_eq!("devtools".parse::<BackendKind>().unwrap(), BackendKind::Devtools);
        assert!("bard".parse::<ResearchSite>().is_err());
        assert!("selenium".parse::<BackendKind>().is_err());
    }

    #[tokio::test]
    async fn test_load_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("research.toml");
        let manager = FileConfigManager::new(config_path.clone()).with_env_prefix("DRS_TEST_DEFAULT");

        let config = manager.load_config().await.unwrap();

        assert!(config_path.exists());
        assert_eq!(config.research.site, ResearchSite::Gemini);
        assert_eq!(config.research.backend, BackendKind::Stealth);
        assert_eq!(config.research.max_retries, 3);
        assert_eq!(config.browser.probe_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("research.toml");
        fs::write(
            &config_path,
            r#"
[browser]
headless = false
probe_timeout = "2s"
navigation_timeout = "20s"

[browser.viewport]
width = 1280
height = 720

[research]
site = "perplexity"
backend = "devtools"
max_retries = 4
backoff_unit = "500ms"
"#,
        )
        .unwrap();

        let manager = FileConfigManager::new(config_path).with_env_prefix("DRS_TEST_FILE");
        let app_config = manager.load_config().await.unwrap();
        assert!(!app_config.browser.headless);
        assert_eq!(app_config.research.backend, BackendKind::Devtools);

        let config = app_config.into_scraper_config().unwrap();
        assert_eq!(config.site, ResearchSite::Perplexity);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.backoff_unit, Duration::from_millis(500));
        assert_eq!(config.viewport, Viewport { width: 1280, height: 720 });
    }

    #[tokio::test]
    async fn test_config_validation() {
        let manager = FileConfigManager::new(PathBuf::from("test.toml"));

        let valid_config = AppConfig::default();
        assert!(manager.validate_config(&valid_config).is_ok());

        let mut invalid_config = AppConfig::default();
        invalid_config.research.max_retries = 0;
        assert!(manager.validate_config(&invalid_config).is_err());

        let mut invalid_config = AppConfig::default();
        invalid_config.research.max_retries = 11;
        assert!(manager.validate_config(&invalid_config).is_err());

        let mut invalid_config = AppConfig::default();
        invalid_config.research.backend = BackendKind::Agent;
        invalid_config.agent.endpoint = "localhost:8765".to_string();
        assert!(manager.validate_config(&invalid_config).is_err());

        let mut invalid_config = AppConfig::default();
        invalid_config.cookies.push(AuthCookie {
            name: "".to_string(),
            value: "x".to_string(),
            domain: ".google.com".to_string(),
            path: None,
        });
        assert!(manager.validate_config(&invalid_config).is_err());
    }

    #[tokio::test]
    async fn test_save_and_reload_keeps_durations_readable() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("research.toml");
        let manager = FileConfigManager::new(config_path.clone()).with_env_prefix("DRS_TEST_SAVE");

        let mut config = AppConfig::default();
        config.research.backoff_unit = Duration::from_secs(2);
        manager.save_config(&config).await.unwrap();

        let written = fs::read_to_string(&config_path).unwrap();
        assert!(written.contains("backoff_unit = \"2s\""), "unexpected file:\n{}", written);

        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded.research.backoff_unit, Duration::from_secs(2));
    }

    #[test]
    fn test_default_app_config_targets_auth_site_without_credentials() {
        // the default file has no credentials, so converting it must fail fast
        let err = AppConfig::default().into_scraper_config();
        assert!(matches!(err, Err(ScrapingError::Configuration(_))));

        let mut config = AppConfig::default();
        config.credentials.email = Some("researcher@example.com".to_string());
        config.credentials.password = Some("hunter2".to_string());
        let scraper_config = config.into_scraper_config().unwrap();
        assert!(scraper_config.credentials.is_some());
    }
}
