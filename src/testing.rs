//! Recording in-memory browser used by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser::{BrowserLauncher, BrowserSession, LaunchOptions, PageElement};
use crate::error::{Result, ScrapingError};
use crate::registry::Locator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start,
    Navigate(String),
    CurrentUrl,
    Find(Locator),
    Click(Locator),
    Fill(Locator, String),
    Press(Locator, String),
    ReadText(Locator),
    Close,
}

#[derive(Default)]
struct PageState {
    url: String,
    /// Successive `read_text` results; the last one repeats.
    elements: HashMap<Locator, VecDeque<String>>,
    /// Locators that only show up after this many lookups.
    delayed: HashMap<Locator, usize>,
    broken: HashSet<Locator>,
    /// Clicking the key navigates to the value.
    click_navigations: HashMap<Locator, String>,
    fail_start: Option<ScrapingError>,
    /// How many upcoming `navigate` calls fail.
    failing_navigations: usize,
    calls: Vec<Call>,
}

/// Shared handle: configure the page, hand out launchers, inspect calls.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<PageState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, locator: Locator, text: &str) -> Self {
        self.with_texts(locator, &[text])
    }

    pub fn with_texts(self, locator: Locator, texts: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .elements
            .insert(locator, texts.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_delayed_element(self, locator: Locator, after_lookups: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.elements.insert(locator.clone(), VecDeque::from(vec![String::new()]));
            state.delayed.insert(locator, after_lookups);
        }
        self
    }

    pub fn with_broken(self, locator: Locator) -> Self {
        self.state.lock().unwrap().broken.insert(locator);
        self
    }

    pub fn with_click_navigation(self, locator: Locator, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .click_navigations
            .insert(locator, url.to_string());
        self
    }

    pub fn failing_start(self, err: ScrapingError) -> Self {
        self.state.lock().unwrap().fail_start = Some(err);
        self
    }

    pub fn failing_navigations(self, count: usize) -> Self {
        self.state.lock().unwrap().failing_navigations = count;
        self
    }

    pub fn launcher(&self) -> Arc<dyn BrowserLauncher> {
        Arc::new(self.clone())
    }

    pub fn session(&self) -> FakeSession {
        FakeSession {
            state: self.state.clone(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn finds(&self) -> Vec<Locator> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Find(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn start(&self, _options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start);
        if let Some(err) = state.fail_start.clone() {
            return Err(err);
        }
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

pub struct FakeSession {
    state: Arc<Mutex<PageState>>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Navigate(url.to_string()));
        if state.failing_navigations > 0 {
            state.failing_navigations -= 1;
            return Err(ScrapingError::Browser("net::ERR_TIMED_OUT".to_string()));
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CurrentUrl);
        Ok(state.url.clone())
    }

    async fn find(&self, locator: &Locator, timeout: Duration) -> Result<Option<Box<dyn PageElement>>> {
        let found = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Find(locator.clone()));
            if state.broken.contains(locator) {
                return Err(ScrapingError::Browser(format!("detached while probing {}", locator)));
            }
            let ready = match state.delayed.get_mut(locator) {
                Some(0) | None => true,
                Some(remaining) => {
                    *remaining -= 1;
                    false
                }
            };
            ready && state.elements.contains_key(locator)
        };

        if found {
            Ok(Some(Box::new(FakeElement {
                locator: locator.clone(),
                state: self.state.clone(),
            })))
        } else {
            // a real engine waits out the whole budget before giving up
            tokio::time::sleep(timeout).await;
            Ok(None)
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().calls.push(Call::Close);
        Ok(())
    }
}

struct FakeElement {
    locator: Locator,
    state: Arc<Mutex<PageState>>,
}

#[async_trait]
impl PageElement for FakeElement {
    async fn click(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Click(self.locator.clone()));
        if let Some(url) = state.click_navigations.get(&self.locator).cloned() {
            state.url = url;
        }
        Ok(())
    }

    async fn fill(&self, text: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Fill(self.locator.clone(), text.to_string()));
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Press(self.locator.clone(), key.to_string()));
        Ok(())
    }

    async fn read_text(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReadText(self.locator.clone()));
        let texts = state.elements.entry(self.locator.clone()).or_default();
        let text = if texts.len() > 1 {
            texts.pop_front().unwrap_or_default()
        } else {
            texts.front().cloned().unwrap_or_default()
        };
        Ok(text)
    }
}
