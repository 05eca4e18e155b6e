//! Login state machine for sites behind an account wall.
//!
//! `Start → NavigatingLogin → EnteringEmail → EnteringPassword →
//! AwaitingTwoFactor → VerifyingSuccess → Authenticated | Failed`
//!
//! A session that is already signed in (preloaded cookies) goes straight
//! from `NavigatingLogin` to `VerifyingSuccess`.
//!
//! Every step is bounded by the instruction set's budgets. A missing
//! two-factor prompt is normal; a missing success indicator is reported as
//! `Ok(false)` and left to the caller.


use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::BrowserSession;
use crate::config::{Credentials, SiteConfig};
use crate::error::{Result, ScrapingError};
use crate::registry::{Locator, SiteInstructionSet};
use crate::resolver::SelectorResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStep {
    Start,
    NavigatingLogin,
    EnteringEmail,
    EnteringPassword,
    AwaitingTwoFactor,
    VerifyingSuccess,
    Authenticated,
    Failed,
}

impl AuthStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthStep::Authenticated | AuthStep::Failed)
    }

    fn can_advance_to(&self, next: AuthStep) -> bool {
        use AuthStep::*;
        match (self, next) {
            (Start, NavigatingLogin)
            | (NavigatingLogin, EnteringEmail)
            | (NavigatingLogin, VerifyingSuccess)
            | (EnteringEmail, EnteringPassword)
            | (EnteringPassword, AwaitingTwoFactor)
            | (AwaitingTwoFactor, VerifyingSuccess)
            | (VerifyingSuccess, Authenticated) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthStep::Start => "start",
            AuthStep::NavigatingLogin => "login navigation",
            AuthStep::EnteringEmail => "email",
            AuthStep::EnteringPassword => "password",
            AuthStep::AwaitingTwoFactor => "two-factor",
            AuthStep::VerifyingSuccess => "verification",
            AuthStep::Authenticated => "authenticated",
            AuthStep::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of one login attempt. Built fresh for every attempt and dropped
/// with it.
#[derive(Clone)]
pub struct AuthSession {
    id: Uuid,
    step: AuthStep,
    two_factor_code: Option<String>,
    succeeded: bool,
    history: Vec<AuthStep>,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("id", &self.id)
            .field("step", &self.step)
            .field("two_factor_code", &self.two_factor_code.as_ref().map(|_| "<redacted>"))
            .field("succeeded", &self.succeeded)
            .finish()
    }
}

impl AuthSession {
    pub fn new(two_factor_code: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            step: AuthStep::Start,
            two_factor_code,
            succeeded: false,
            history: vec![AuthStep::Start],
        }
    }

    pub fn step(&self) -> AuthStep {
        self.step
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Every step visited so far, in order.
    pub fn history(&self) -> &[AuthStep] {
        &self.history
    }

    pub fn reached(&self, step: AuthStep) -> bool {
        self.history.contains(&step)
    }

    fn advance(&mut self, next: AuthStep) -> Result<()> {
        if !self.step.can_advance_to(next) {
            return Err(ScrapingError::authentication(
                self.step,
                format!("illegal transition from {} to {}", self.step, next),
            ));
        }
        debug!("Auth session {}: {} -> {}", self.id, self.step, next);
        self.step = next;
        self.history.push(next);
        if next == AuthStep::Authenticated {
            self.succeeded = true;
        }
        Ok(())
    }

    fn fail(&mut self) {
        if !self.step.is_terminal() {
            self.step = AuthStep::Failed;
            self.history.push(AuthStep::Failed);
        }
    }
}

/// Where login navigation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginEntry {
    LoginForm,
    AlreadySignedIn,
}

/// Drives the login pages of one site on one browser session.
pub struct AuthFlow<'a> {
    session: &'a dyn BrowserSession,
    site: &'static SiteConfig,
    instructions: &'a SiteInstructionSet,
    credentials: &'a Credentials,
    probe_timeout: Duration,
}

impl<'a> AuthFlow<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        site: &'static SiteConfig,
        instructions: &'a SiteInstructionSet,
        credentials: &'a Credentials,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            session,
            site,
            instructions,
            credentials,
            probe_timeout,
        }
    }

    /// Runs the machine to a terminal state.
    ///
    /// `Ok(true)` once authenticated, `Ok(false)` when the success indicator
    /// never showed up. Sites without authentication return `Ok(true)`
    /// without touching the session.
    pub async fn run(&self, auth: &mut AuthSession) -> Result<bool> {
        if !self.site.requires_auth {
            return Ok(true);
        }
        if auth.step() != AuthStep::Start {
            return Err(ScrapingError::authentication(
                auth.step(),
                "auth session has already been used",
            ));
        }

        info!("Starting login for {}", self.site.url);
        match self.drive(auth).await {
            Ok(true) => {
                auth.advance(AuthStep::Authenticated)?;
                info!("Login verified");
                Ok(true)
            }
            Ok(false) => {
                auth.advance(AuthStep::Failed)?;
                warn!("Login could not be verified within {:?}", self.instructions.waits.auth_step);
                Ok(false)
            }
            Err(e) => {
                auth.fail();
                Err(e)
            }
        }
    }

    async fn drive(&self, auth: &mut AuthSession) -> Result<bool> {
        auth.advance(AuthStep::NavigatingLogin)?;
        if self.reach_login_page().await? == LoginEntry::AlreadySignedIn {
            auth.advance(AuthStep::VerifyingSuccess)?;
            return Ok(true);
        }

        auth.advance(AuthStep::EnteringEmail)?;
        self.submit_field(
            AuthStep::EnteringEmail,
            "email field",
            &self.instructions.selectors.email_field,
            &self.credentials.email,
        )
        .await?;

        auth.advance(AuthStep::EnteringPassword)?;
        self.submit_field(
            AuthStep::EnteringPassword,
            "password field",
            &self.instructions.selectors.password_field,
            &self.credentials.password,
        )
        .await?;

        auth.advance(AuthStep::AwaitingTwoFactor)?;
        let code = auth.two_factor_code.clone();
        self.handle_two_factor(code.as_deref()).await?;

        auth.advance(AuthStep::VerifyingSuccess)?;
        Ok(self.verify().await)
    }

    async fn on_login_page(&self) -> bool {
        let Some(login_url) = self.site.login_url else {
            return false;
        };
        match self.session.current_url().await {
            Ok(url) => url.starts_with(login_url),
            Err(e) => {
                debug!("Could not read current url: {}", e);
                false
            }
        }
    }

    async fn reach_login_page(&self) -> Result<LoginEntry> {
        let step = AuthStep::NavigatingLogin;
        let waits = self.instructions.waits;
        let deadline = Instant::now() + waits.auth_step;
        let resolver = SelectorResolver::new(self.session);

        loop {
            if self.on_login_page().await {
                info!("Already on the login page");
                return Ok(LoginEntry::LoginForm);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let per_candidate = self.probe_timeout.min(remaining);
            if let Some((index, trigger)) = resolver
                .probe(&self.instructions.selectors.sign_in_trigger, per_candidate)
                .await
            {
                info!("Activating sign-in trigger {}", index);
                trigger.click().await.map_err(|e| tag(step, e))?;
                return Ok(LoginEntry::LoginForm);
            }

            // no way in, but the signed-in surface is already up
            if resolver
                .probe(&self.instructions.selectors.query_input, Duration::ZERO)
                .await
                .is_some()
            {
                info!("Session is already signed in");
                return Ok(LoginEntry::AlreadySignedIn);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ScrapingError::authentication(
                    step,
                    format!(
                        "neither a sign-in trigger nor the login page appeared within {:?}",
                        waits.auth_step
                    ),
                ));
            }
            tokio::time::sleep(waits.poll_interval.min(deadline - now)).await;
        }
    }

    async fn submit_field(
        &self,
        step: AuthStep,
        what: &str,
        candidates: &[Locator],
        value: &str,
    ) -> Result<()> {
        let resolver = SelectorResolver::new(self.session);
        let field = resolver
            .resolve(what, candidates, self.probe_timeout)
            .await
            .map_err(|e| tag(step, e))?;
        field.fill(value).await.map_err(|e| tag(step, e))?;
        info!("Entered {}", what);
        self.click_next(step).await
    }

    async fn click_next(&self, step: AuthStep) -> Result<()> {
        let resolver = SelectorResolver::new(self.session);
        let next = resolver
            .resolve("next control", &self.instructions.selectors.next_control, self.probe_timeout)
            .await
            .map_err(|e| tag(step, e))?;
        next.click().await.map_err(|e| tag(step, e))
    }

    async fn handle_two_factor(&self, code: Option<&str>) -> Result<()> {
        let step = AuthStep::AwaitingTwoFactor;
        let resolver = SelectorResolver::new(self.session);

        let Some((_, input)) = resolver
            .probe(&self.instructions.selectors.two_factor_input, self.probe_timeout)
            .await
        else {
            debug!("No two-factor prompt, continuing");
            return Ok(());
        };

        let Some(code) = code else {
            return Err(ScrapingError::authentication(
                step,
                "two-factor prompt shown but no code was supplied",
            ));
        };

        info!("Entering two-factor code");
        input.fill(code).await.map_err(|e| tag(step, e))?;
        self.click_next(step).await
    }

    async fn verify(&self) -> bool {
        let waits = self.instructions.waits;
        let deadline = Instant::now() + waits.auth_step;
        let resolver = SelectorResolver::new(self.session);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if resolver
                .probe(&self.instructions.selectors.query_input, self.probe_timeout.min(remaining))
                .await
                .is_some()
            {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(waits.poll_interval.min(deadline - now)).await;
        }
    }
}

/// Re-labels a failure as an authentication error for `step`.
fn tag(step: AuthStep, err: ScrapingError) -> ScrapingError {
    match err {
        ScrapingError::Authentication { .. } => err,
        other => ScrapingError::authentication(step, other.to_string()),
    }
}
