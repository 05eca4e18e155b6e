use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::locate::{marker_selector, marking_script};
use crate::browser::stealth::{generate_stealth_script, FingerprintRandomizer, UserAgentGenerator};
use crate::browser::{BrowserLauncher, BrowserSession, LaunchOptions, PageElement};
use crate::error::{Result, ScrapingError};
use crate::registry::Locator;

const FIND_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Throwaway Chromium profile, removed when the handle drops.
pub(crate) fn profile_dir(id: Uuid) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("deep-research-{}-", id.simple()))
        .tempdir()
        .map_err(|e| ScrapingError::Setup(format!("Failed to create browser profile: {}", e)))
}

/// Launches Chromium through the devtools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }

    fn browser_config(options: &LaunchOptions, user_data_dir: &Path) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(user_data_dir)
            .window_size(options.viewport.width, options.viewport.height)
            .args(options.args.iter().map(String::as_str));

        if !options.headless {
            builder = builder.with_head();
        }

        builder
            .build()
            .map_err(|e| ScrapingError::Setup(format!("Failed to create browser config: {}", e)))
    }

    async fn apply_stealth(page: &Page, options: &LaunchOptions) -> Result<()> {
        let Some(stealth) = &options.stealth else {
            return Ok(());
        };

        let fingerprint = FingerprintRandomizer::new()
            .generate_fingerprint(options.viewport, stealth.fingerprint_randomization);
        let agents = UserAgentGenerator::new();
        let user_agent = if stealth.randomize_user_agents {
            agents.random_user_agent()
        } else {
            agents.default_user_agent()
        };

        let device_metrics = SetDeviceMetricsOverrideParams::builder()
            .width(fingerprint.viewport.width as i64)
            .height(fingerprint.viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| ScrapingError::Setup(format!("Failed to build device metrics: {}", e)))?;
        page.execute(device_metrics)
            .await
            .map_err(|e| ScrapingError::Setup(format!("Failed to set viewport: {}", e)))?;

        let user_agent_params = SetUserAgentOverrideParams::builder()
            .user_agent(user_agent)
            .accept_language(&fingerprint.language)
            .platform(&fingerprint.platform)
            .build()
            .map_err(|e| ScrapingError::Setup(format!("Failed to build user agent params: {}", e)))?;
        page.execute(user_agent_params)
            .await
            .map_err(|e| ScrapingError::Setup(format!("Failed to set user agent: {}", e)))?;

        if stealth.mask_automation {
            let script = generate_stealth_script(&fingerprint);
            page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(script))
                .await
                .map_err(|e| ScrapingError::Setup(format!("Failed to install stealth script: {}", e)))?;
        }

        debug!("Applied stealth profile ({}, {})", fingerprint.platform, fingerprint.timezone);
        Ok(())
    }

    async fn apply_cookies(page: &Page, options: &LaunchOptions) -> Result<()> {
        if options.cookies.is_empty() {
            return Ok(());
        }

        let cookies: Vec<CookieParam> = options
            .cookies
            .iter()
            .map(|c| {
                let mut cookie = CookieParam::new(c.name.clone(), c.value.clone());
                cookie.domain = Some(c.domain.clone());
                cookie.path = Some(c.path.clone().unwrap_or_else(|| "/".to_string()));
                cookie
            })
            .collect();

        info!("Preloading {} authentication cookies", cookies.len());
        page.set_cookies(cookies)
            .await
            .map_err(|e| ScrapingError::Setup(format!("Failed to set cookies: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn start(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        let id = Uuid::new_v4();
        let profile = profile_dir(id)?;
        let config = Self::browser_config(options, profile.path())?;

        info!(
            "Launching browser session {} (headless: {}, stealth: {})",
            id,
            options.headless,
            options.stealth.is_some()
        );
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapingError::Setup(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    // filter out common websocket deserialization noise
                    let error_msg = e.to_string();
                    if error_msg.contains("data did not match any variant")
                        || error_msg.contains("untagged enum Message")
                    {
                        debug!("Ignoring WebSocket deserialization error: {}", e);
                    } else {
                        warn!("Browser handler error: {}", e);
                    }
                }
            }
            debug!("Browser handler task ended");
        });

        let opened = tokio::time::timeout(options.navigation_timeout, browser.new_page("about:blank")).await;
        let page = match opened {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(ScrapingError::Setup(format!("Failed to create new page: {}", e)));
            }
            Err(_) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(ScrapingError::Setup("Timeout creating new page".to_string()));
            }
        };

        let session = ChromeSession {
            id,
            page,
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            profile: Mutex::new(Some(profile)),
            navigation_timeout: options.navigation_timeout,
        };

        // a half-configured session is still ours to close
        if let Err(e) = Self::apply_stealth(&session.page, options).await {
            let _ = session.close().await;
            return Err(e);
        }
        if let Err(e) = Self::apply_cookies(&session.page, options).await {
            let _ = session.close().await;
            return Err(e);
        }

        Ok(Box::new(session))
    }
}

pub struct ChromeSession {
    id: Uuid,
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    profile: Mutex<Option<TempDir>>,
    navigation_timeout: Duration,
}

impl ChromeSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn locate_once(&self, locator: &Locator) -> Result<Option<Element>> {
        let selector = match locator {
            Locator::Css { selector } => selector.clone(),
            Locator::Role { .. } | Locator::Text { .. } => {
                let token = Uuid::new_v4().simple().to_string();
                let Some(script) = marking_script(locator, &token) else {
                    return Ok(None);
                };
                let marked: bool = self
                    .page
                    .evaluate(script)
                    .await?
                    .into_value()
                    .map_err(|e| ScrapingError::Browser(format!("Unexpected locator result: {}", e)))?;
                if !marked {
                    return Ok(None);
                }
                marker_selector(&token)
            }
        };

        // find_element errors when nothing matches yet
        Ok(self.page.find_element(selector).await.ok())
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        info!("Navigating browser session {} to {}", self.id, url);

        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScrapingError::Browser(format!("Failed to navigate to {}: {}", url, e))),
            Err(_) => Err(ScrapingError::Browser(format!(
                "Navigation to {} timed out after {:?}",
                url, self.navigation_timeout
            ))),
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn find(&self, locator: &Locator, timeout: Duration) -> Result<Option<Box<dyn PageElement>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.locate_once(locator).await? {
                return Ok(Some(Box::new(ChromeElement { element })));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(FIND_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn close(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser session {} cleanly: {}", self.id, e);
        }
        let _ = browser.wait().await;

        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }

        // only safe once chromium has exited and released its files
        if let Some(profile) = self.profile.lock().await.take() {
            let path = profile.path().to_path_buf();
            if let Err(e) = profile.close() {
                warn!("Failed to remove browser profile {}: {}", path.display(), e);
            }
        }

        info!("Closed browser session {}", self.id);
        Ok(())
    }
}

pub struct ChromeElement {
    element: Element,
}

#[async_trait]
impl PageElement for ChromeElement {
    async fn click(&self) -> Result<()> {
        self.element.click().await?;
        Ok(())
    }

    async fn fill(&self, text: &str) -> Result<()> {
        self.element.focus().await?;
        self.element
            .call_js_fn(
                "function() { if ('value' in this) { this.value = ''; } else { this.textContent = ''; } }",
                false,
            )
            .await?;
        self.element.type_str(text).await?;
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        self.element.press_key(key).await?;
        Ok(())
    }

    async fn read_text(&self) -> Result<String> {
        Ok(self.element.inner_text().await?.unwrap_or_default())
    }
}
