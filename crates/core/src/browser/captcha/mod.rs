//! CAPTCHA detection and solving.

mod solver;

pub use solver::{CaptchaConfig, CaptchaSolver, SolverError, SolverProvider, TaskApiSolver};

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::engine::{BrowserContext, Page};
use super::login::AuthError;

/// Known CAPTCHA products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaKind {
    RecaptchaV2,
    HCaptcha,
    GeeTest,
    Turnstile,
}

/// How a challenge is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    Image,
    Puzzle,
    ManagedChallenge,
}

impl CaptchaKind {
    pub fn challenge_type(&self) -> ChallengeType {
        match self {
            CaptchaKind::RecaptchaV2 | CaptchaKind::HCaptcha => ChallengeType::Image,
            CaptchaKind::GeeTest => ChallengeType::Puzzle,
            CaptchaKind::Turnstile => ChallengeType::ManagedChallenge,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptchaKind::RecaptchaV2 => "recaptcha_v2",
            CaptchaKind::HCaptcha => "hcaptcha",
            CaptchaKind::GeeTest => "geetest",
            CaptchaKind::Turnstile => "turnstile",
        }
    }

    /// Form field the solved token travels in.
    pub fn response_field(&self) -> &'static str {
        match self {
            CaptchaKind::RecaptchaV2 => "g-recaptcha-response",
            CaptchaKind::HCaptcha => "h-captcha-response",
            CaptchaKind::GeeTest => "geetest_validate",
            CaptchaKind::Turnstile => "cf-turnstile-response",
        }
    }
}

/// A detected challenge. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptchaChallenge {
    pub kind: CaptchaKind,
    pub page_url: String,
    pub site_key: Option<String>,
    /// Solver that handled it, once solved.
    pub solver: Option<String>,
}

struct Detector {
    kind: CaptchaKind,
    marker: Regex,
    site_key: Option<Regex>,
}

static DETECTORS: Lazy<Vec<Detector>> = Lazy::new(|| {
    [
        (
            CaptchaKind::Turnstile,
            r"(?i)cf-turnstile|challenges\.cloudflare\.com/turnstile|cf-chl-",
            Some(r#"(?i)class="[^"]*cf-turnstile[^"]*"[^>]*data-sitekey="([^"]+)""#),
        ),
        (
            CaptchaKind::HCaptcha,
            r"(?i)h-captcha|hcaptcha\.com/1/api\.js",
            Some(r#"(?i)class="[^"]*h-captcha[^"]*"[^>]*data-sitekey="([^"]+)""#),
        ),
        (
            CaptchaKind::RecaptchaV2,
            r"(?i)g-recaptcha|google\.com/recaptcha/api\.js|recaptcha/enterprise\.js",
            Some(r#"(?i)class="[^"]*g-recaptcha[^"]*"[^>]*data-sitekey="([^"]+)""#),
        ),
        (
            CaptchaKind::GeeTest,
            r"(?i)initGeetest|geetest_|static\.geetest\.com",
            Some(r#"(?i)(?:data-gt|gt)\s*[=:]\s*["']([0-9a-f]{32})["']"#),
        ),
    ]
    .into_iter()
    .filter_map(|(kind, marker, key)| {
        Some(Detector {
            kind,
            marker: Regex::new(marker).ok()?,
            site_key: key.and_then(|k| Regex::new(k).ok()),
        })
    })
    .collect()
});

/// Inspect a page for a CAPTCHA widget or interstitial.
pub fn detect_captcha(page: &Page) -> Option<CaptchaChallenge> {
    DETECTORS.iter().find_map(|d| {
        if !d.marker.is_match(&page.html) {
            return None;
        }
        let site_key = d
            .site_key
            .as_ref()
            .and_then(|re| re.captures(&page.html))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        Some(CaptchaChallenge {
            kind: d.kind,
            page_url: page.url.clone(),
            site_key,
            solver: None,
        })
    })
}

/// Detect-solve-inject, shared by every login flow.
#[derive(Clone)]
pub struct CaptchaGuard {
    solver: Option<Arc<dyn CaptchaSolver>>,
    min_balance: f64,
}

impl CaptchaGuard {
    pub fn new(solver: Option<Arc<dyn CaptchaSolver>>, min_balance: f64) -> Self {
        Self {
            solver,
            min_balance,
        }
    }

    /// A guard with no solver; any challenge fails the login.
    pub fn disabled() -> Self {
        Self::new(None, 0.0)
    }

    pub fn has_solver(&self) -> bool {
        self.solver.is_some()
    }

    /// If `page` carries a challenge, solve it and inject the token.
    ///
    /// Returns the page to continue from: managed challenges are reloaded,
    /// widget challenges keep the page and carry the token in the next form
    /// submission. Returns the solved challenge, if any.
    pub async fn resolve(
        &self,
        ctx: &dyn BrowserContext,
        page: Page,
    ) -> Result<(Page, Option<CaptchaChallenge>), AuthError> {
        let Some(mut challenge) = detect_captcha(&page) else {
            return Ok((page, None));
        };
        info!(
            kind = challenge.kind.as_str(),
            url = %challenge.page_url,
            "CAPTCHA detected"
        );

        let Some(solver) = &self.solver else {
            return Err(AuthError::SolverUnavailable(format!(
                "{} challenge at {} but no solver is configured",
                challenge.kind.as_str(),
                challenge.page_url
            )));
        };

        let balance = solver.get_balance().await.map_err(|e| {
            AuthError::SolverUnavailable(format!("{} balance check failed: {}", solver.provider(), e))
        })?;
        if balance < self.min_balance {
            warn!(provider = solver.provider(), balance, "CAPTCHA solver balance too low");
            return Err(AuthError::SolverUnavailable(format!(
                "{} balance {:.4} below minimum {:.4}",
                solver.provider(),
                balance,
                self.min_balance
            )));
        }

        let token = solver.solve(&challenge).await.map_err(|e| match e {
            SolverError::NotConfigured(_) | SolverError::InsufficientBalance => {
                AuthError::SolverUnavailable(e.to_string())
            }
            other => AuthError::Solver(other),
        })?;
        challenge.solver = Some(solver.provider().to_string());
        crate::metrics::CAPTCHAS_SOLVED
            .with_label_values(&[challenge.kind.as_str()])
            .inc();

        ctx.inject_captcha_token(&challenge, &token).await?;

        if challenge.kind.challenge_type() == ChallengeType::ManagedChallenge {
            let reloaded = ctx.goto(&page.url).await?;
            if detect_captcha(&reloaded).is_some() {
                return Err(AuthError::Captcha(format!(
                    "managed challenge still present at {}",
                    reloaded.url
                )));
            }
            return Ok((reloaded, Some(challenge)));
        }
        Ok((page, Some(challenge)))
    }
}
