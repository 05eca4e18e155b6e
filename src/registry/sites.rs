use std::time::Duration;

use super::{AgentTaskTemplate, Locator, SelectorSet, SiteInstructionSet, WaitBudgets};
use crate::config::{BackendKind, ResearchSite};

const AGENT_TASK: &str = "Go to {url}\n{login}Type this research query into {query_input} and submit it: {query}\nWait for {response_container} to finish and extract the complete response";
const AGENT_LOGIN: &str = "Click {sign_in_trigger}, then log in with email '{email}' in {email_field} and password '{password}' in {password_field}, clicking {next_control} after each\n";

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

fn css(list: &[&str]) -> Vec<Locator> {
    list.iter().map(|s| Locator::css(*s)).collect()
}

fn text(list: &[&str]) -> Vec<Locator> {
    list.iter().map(|s| Locator::text(*s)).collect()
}

fn agent_template() -> Option<AgentTaskTemplate> {
    Some(AgentTaskTemplate {
        task: AGENT_TASK.to_string(),
        login_clause: AGENT_LOGIN.to_string(),
    })
}

pub(super) fn builtin_instruction_sets() -> Vec<SiteInstructionSet> {
    vec![
        gemini_stealth(),
        gemini_devtools(),
        gemini_agent(),
        perplexity_stealth(),
        perplexity_devtools(),
        perplexity_agent(),
    ]
}

fn gemini_stealth() -> SiteInstructionSet {
    SiteInstructionSet {
        site: ResearchSite::Gemini,
        backend: BackendKind::Stealth,
        selectors: SelectorSet {
            query_input: css(&[
                "textarea[aria-label*=\"chat input\"]",
                "textarea[placeholder*=\"Enter a prompt\"]",
                "rich-textarea [contenteditable=\"true\"]",
                "[contenteditable=\"true\"][role=\"textbox\"]",
            ]),
            response_container: css(&[
                ".chat-message[role=\"presentation\"]",
                "message-content .markdown",
                ".model-response-text",
                ".response-content",
            ]),
            sign_in_trigger: vec![
                Locator::css("[data-test-id=\"action-button\"]"),
                Locator::role("link", "Sign in"),
                Locator::role("button", "Sign in"),
            ],
            email_field: css(&["input[type=\"email\"]", "#identifierId"]),
            password_field: css(&["input[type=\"password\"]", "input[name=\"Passwd\"]"]),
            next_control: vec![
                Locator::css("#identifierNext button"),
                Locator::css("#passwordNext button"),
                Locator::role("button", "Next"),
            ],
            two_factor_input: css(&["input[type=\"tel\"]", "input[name=\"totpPin\"]"]),
            dismissals: vec![Locator::role("button", "Got it")],
        },
        waits: WaitBudgets {
            pre_input: secs(2.0),
            post_input: secs(2.0),
            response: secs(30.0),
            auth_step: secs(10.0),
            poll_interval: secs(1.0),
        },
        agent_task: None,
    }
}

fn gemini_devtools() -> SiteInstructionSet {
    SiteInstructionSet {
        site: ResearchSite::Gemini,
        backend: BackendKind::Devtools,
        selectors: SelectorSet {
            query_input: vec![Locator::css("textarea"), Locator::text("Enter a prompt here")],
            response_container: vec![Locator::css(".response-content"), Locator::css("message-content")],
            sign_in_trigger: text(&["Sign in"]),
            email_field: vec![Locator::css("input[type=\"email\"]"), Locator::text("email")],
            password_field: vec![Locator::css("input[type=\"password\"]"), Locator::text("password")],
            next_control: text(&["Next"]),
            two_factor_input: vec![Locator::css("input[type=\"tel\"]"), Locator::text("Enter code")],
            dismissals: text(&["Got it"]),
        },
        waits: WaitBudgets {
            pre_input: secs(2.0),
            post_input: secs(2.0),
            response: secs(20.0),
            auth_step: secs(5.0),
            poll_interval: secs(1.0),
        },
        agent_task: None,
    }
}

fn gemini_agent() -> SiteInstructionSet {
    SiteInstructionSet {
        site: ResearchSite::Gemini,
        backend: BackendKind::Agent,
        selectors: SelectorSet {
            query_input: text(&["the chat input box"]),
            response_container: text(&["the latest model response"]),
            sign_in_trigger: text(&["the Sign in button"]),
            email_field: text(&["the email field"]),
            password_field: text(&["the password field"]),
            next_control: text(&["the Next button"]),
            two_factor_input: text(&["the verification code field"]),
            dismissals: Vec::new(),
        },
        waits: WaitBudgets {
            pre_input: secs(3.0),
            post_input: secs(3.0),
            response: secs(10.0),
            auth_step: secs(10.0),
            poll_interval: secs(1.0),
        },
        agent_task: agent_template(),
    }
}

fn perplexity_stealth() -> SiteInstructionSet {
    SiteInstructionSet {
        site: ResearchSite::Perplexity,
        backend: BackendKind::Stealth,
        selectors: SelectorSet {
            query_input: css(&[
                "textarea[placeholder*=\"Ask anything\"]",
                "textarea[placeholder*=\"Message Perplexity\"]",
                "textarea[placeholder*=\"Ask\"]",
                "textarea[placeholder*=\"Message\"]",
                "textarea[role=\"textbox\"]",
                "textarea",
                "[contenteditable=\"true\"]",
                "[role=\"textbox\"]",
            ]),
            response_container: css(&[
                ".response-content",
                "[data-message-author-role=\"assistant\"]",
                ".prose",
                ".markdown-content",
                "[role=\"article\"]",
                "[role=\"presentation\"]",
            ]),
            sign_in_trigger: vec![
                Locator::role("button", "Log in"),
                Locator::role("button", "Login"),
                Locator::role("button", "Sign in"),
                Locator::role("link", "Log in"),
                Locator::role("link", "Sign in"),
            ],
            email_field: css(&["input[type=\"email\"]"]),
            password_field: css(&["input[type=\"password\"]"]),
            next_control: vec![Locator::role("button", "Continue"), Locator::role("button", "Next")],
            two_factor_input: css(&["input[autocomplete=\"one-time-code\"]"]),
            dismissals: Vec::new(),
        },
        waits: WaitBudgets {
            pre_input: secs(2.0),
            post_input: secs(2.0),
            response: secs(15.0),
            auth_step: secs(5.0),
            poll_interval: secs(1.0),
        },
        agent_task: None,
    }
}

fn perplexity_devtools() -> SiteInstructionSet {
    SiteInstructionSet {
        site: ResearchSite::Perplexity,
        backend: BackendKind::Devtools,
        selectors: SelectorSet {
            query_input: vec![
                Locator::css("textarea[placeholder*=\"Ask anything\"]"),
                Locator::css("textarea[placeholder*=\"Message Perplexity\"]"),
                Locator::text("Ask anything"),
            ],
            response_container: css(&[".response-content", ".markdown-content"]),
            sign_in_trigger: text(&["Log in", "Sign in"]),
            email_field: vec![Locator::css("input[type=\"email\"]"), Locator::text("email")],
            password_field: css(&["input[type=\"password\"]"]),
            next_control: text(&["Continue", "Next"]),
            two_factor_input: css(&["input[autocomplete=\"one-time-code\"]"]),
            dismissals: Vec::new(),
        },
        waits: WaitBudgets {
            pre_input: secs(2.0),
            post_input: secs(2.0),
            response: secs(10.0),
            auth_step: secs(5.0),
            poll_interval: secs(1.0),
        },
        agent_task: None,
    }
}

fn perplexity_agent() -> SiteInstructionSet {
    SiteInstructionSet {
        site: ResearchSite::Perplexity,
        backend: BackendKind::Agent,
        selectors: SelectorSet {
            query_input: text(&["the \"Ask anything\" box"]),
            response_container: text(&["the answer text below the question"]),
            sign_in_trigger: text(&["the Log in button"]),
            email_field: text(&["the email field"]),
            password_field: text(&["the password field"]),
            next_control: text(&["the Continue button"]),
            two_factor_input: text(&["the verification code field"]),
            dismissals: Vec::new(),
        },
        waits: WaitBudgets {
            pre_input: secs(3.0),
            post_input: secs(3.0),
            response: secs(10.0),
            auth_step: secs(5.0),
            poll_interval: secs(1.0),
        },
        agent_task: agent_template(),
    }
}
