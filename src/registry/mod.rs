//! Per-(site, backend) DOM knowledge.
//!
//! Everything fragile about a target page lives here as data: which locators
//! find the query box, the answer container and each login control, and how
//! long to wait around each step. A markup change on a site should only ever
//! touch [`sites`].

mod sites;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendKind, ResearchSite};
use crate::error::{Result, ScrapingError};

/// A rule for finding one page element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Standard CSS selector.
    Css { selector: String },
    /// ARIA role plus accessible name, e.g. a `button` named "Next".
    Role { role: String, name: String },
    /// Best fuzzy match on visible text, placeholder or aria-label.
    Text { text: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text { text: text.into() }
    }

    /// Plain-language form, for task text read by an agent.
    pub fn describe(&self) -> String {
        match self {
            Locator::Css { selector } => format!("the element matching `{}`", selector),
            Locator::Role { role, name } => format!("the \"{}\" {}", name, role),
            Locator::Text { text } => text.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "css={}", selector),
            Locator::Role { role, name } => write!(f, "role={}[name=\"{}\"]", role, name),
            Locator::Text { text } => write!(f, "text~\"{}\"", text),
        }
    }
}

/// Ordered candidate lists, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSet {
    pub query_input: Vec<Locator>,
    pub response_container: Vec<Locator>,
    pub sign_in_trigger: Vec<Locator>,
    pub email_field: Vec<Locator>,
    pub password_field: Vec<Locator>,
    pub next_control: Vec<Locator>,
    pub two_factor_input: Vec<Locator>,
    /// Intro/welcome overlays clicked away before querying. May be empty.
    pub dismissals: Vec<Locator>,
}

impl SelectorSet {
    /// Every mandatory list, labelled for error messages.
    pub fn required_lists(&self) -> [(&'static str, &[Locator]); 7] {
        [
            ("query_input", self.query_input.as_slice()),
            ("response_container", self.response_container.as_slice()),
            ("sign_in_trigger", self.sign_in_trigger.as_slice()),
            ("email_field", self.email_field.as_slice()),
            ("password_field", self.password_field.as_slice()),
            ("next_control", self.next_control.as_slice()),
            ("two_factor_input", self.two_factor_input.as_slice()),
        ]
    }

    /// Describes the first candidate of the list called `name`.
    pub fn describe(&self, name: &str) -> Option<String> {
        self.required_lists()
            .into_iter()
            .find(|(list, _)| *list == name)
            .and_then(|(_, candidates)| candidates.first())
            .map(Locator::describe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBudgets {
    pub pre_input: Duration,
    pub post_input: Duration,
    pub response: Duration,
    pub auth_step: Duration,
    /// Pause between response polling ticks.
    pub poll_interval: Duration,
}

/// Natural-language task handed to the agent backend.
///
/// Both texts may name any selector list as a placeholder (`{query_input}`,
/// `{response_container}`, `{email_field}`, ...); it is filled with the
/// description of that list's first candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTaskTemplate {
    /// Also supports `{url}`, `{login}` and `{query}`.
    pub task: String,
    /// Rendered into `{login}` when the site needs authentication.
    /// Also supports `{email}` and `{password}`.
    pub login_clause: String,
}

impl AgentTaskTemplate {
    pub fn render(
        &self,
        url: &str,
        query: &str,
        login: Option<(&str, &str)>,
        selectors: &SelectorSet,
    ) -> String {
        let login = match login {
            Some((email, password)) => expand(&self.login_clause, |name| match name {
                "email" => Some(email.to_string()),
                "password" => Some(password.to_string()),
                other => selectors.describe(other),
            }),
            None => String::new(),
        };

        expand(&self.task, |name| match name {
            "url" => Some(url.to_string()),
            "query" => Some(query.to_string()),
            "login" => Some(login.clone()),
            other => selectors.describe(other),
        })
    }
}

/// Single pass over `{name}` placeholders. Substituted values are never
/// expanded again; unknown names are left as they are.
fn expand(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let filled = tail
            .find('}')
            .and_then(|end| lookup(&tail[1..end]).map(|value| (end, value)));
        match filled {
            Some((end, value)) => {
                out.push_str(&value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInstructionSet {
    pub site: ResearchSite,
    pub backend: BackendKind,
    pub selectors: SelectorSet,
    pub waits: WaitBudgets,
    pub agent_task: Option<AgentTaskTemplate>,
}

impl SiteInstructionSet {
    pub fn validate(&self) -> Result<()> {
        for (name, list) in self.selectors.required_lists() {
            if list.is_empty() {
                return Err(ScrapingError::Configuration(format!(
                    "instruction set for ({}, {}) has an empty {} list",
                    self.site, self.backend, name
                )));
            }
        }
        if self.backend == BackendKind::Agent && self.agent_task.is_none() {
            return Err(ScrapingError::Configuration(format!(
                "instruction set for ({}, agent) has no task template",
                self.site
            )));
        }
        Ok(())
    }
}

/// Lookup table keyed by (site, backend).
#[derive(Debug, Clone, Default)]
pub struct InstructionRegistry {
    entries: HashMap<(ResearchSite, BackendKind), Arc<SiteInstructionSet>>,
}

impl InstructionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The shipped table for every supported pairing.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for set in sites::builtin_instruction_sets() {
            registry.entries.insert((set.site, set.backend), Arc::new(set));
        }
        registry
    }

    pub fn insert(&mut self, set: SiteInstructionSet) -> Result<()> {
        set.validate()?;
        self.entries.insert((set.site, set.backend), Arc::new(set));
        Ok(())
    }

    pub fn lookup(&self, site: ResearchSite, backend: BackendKind) -> Result<Arc<SiteInstructionSet>> {
        self.entries
            .get(&(site, backend))
            .cloned()
            .ok_or(ScrapingError::UnsupportedSite { site, backend })
    }

    pub fn pairs(&self) -> Vec<(ResearchSite, BackendKind)> {
        let mut pairs: Vec<_> = self.entries.keys().copied().collect();
        pairs.sort_by_key(|(site, backend)| (site.as_str(), backend.as_str()));
        pairs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
