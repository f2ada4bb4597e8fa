//! Authenticated browsing for paywalled sources.
//!
//! A [`SessionManager`] hands out logged-in [`BrowserContext`]s per site. It
//! restores persisted sessions from a [`SessionStore`] when they are still
//! good, and otherwise logs in through the site's [`SiteLoginHandler`],
//! solving CAPTCHAs on the way.

pub mod captcha;
mod engine;
mod http_engine;
pub mod login;
mod manager;
mod session;
mod sqlite_store;
mod stealth;
mod store;

pub use captcha::{
    detect_captcha, CaptchaChallenge, CaptchaConfig, CaptchaGuard, CaptchaKind, CaptchaSolver,
    ChallengeType, SolverError, SolverProvider, TaskApiSolver,
};
pub use engine::{
    BrowserContext, BrowserEngine, BrowserError, FormSubmission, Page, StorageState, StoredCookie,
};
pub use http_engine::{HttpBrowserEngine, HttpContext};
pub use login::{AuthError, Credentials, FormLogin, NewspapersLogin, NytimesLogin, SiteLoginHandler};
pub use manager::{AcquireMode, SessionManager};
pub use session::{Session, SessionState};
pub use sqlite_store::SqliteSessionStore;
pub use stealth::{StealthConfig, StealthProfile};
pub use store::{SessionStore, StoreError};
