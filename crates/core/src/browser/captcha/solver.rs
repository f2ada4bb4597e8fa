//! Third-party CAPTCHA solving services.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use super::{CaptchaChallenge, CaptchaKind};

/// Errors from a solving service.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Solver not configured: {0}")]
    NotConfigured(String),

    #[error("Insufficient solver balance")]
    InsufficientBalance,

    #[error("Solver API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Solver gave up after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for SolverError {
    fn from(e: reqwest::Error) -> Self {
        SolverError::Http(e.to_string())
    }
}

/// A CAPTCHA solving service.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    fn provider(&self) -> &str;

    /// Remaining account balance (USD).
    async fn get_balance(&self) -> Result<f64, SolverError>;

    /// Solve a challenge and return the token to inject.
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String, SolverError>;
}

/// Services speaking the createTask/getTaskResult protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverProvider {
    #[serde(alias = "2captcha")]
    TwoCaptcha,
    #[serde(alias = "capsolver")]
    CapSolver,
}

impl SolverProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverProvider::TwoCaptcha => "2captcha",
            SolverProvider::CapSolver => "capsolver",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            SolverProvider::TwoCaptcha => "https://api.2captcha.com",
            SolverProvider::CapSolver => "https://api.capsolver.com",
        }
    }

    fn task_type(&self, kind: CaptchaKind) -> &'static str {
        match (self, kind) {
            (SolverProvider::TwoCaptcha, CaptchaKind::RecaptchaV2) => "RecaptchaV2TaskProxyless",
            (SolverProvider::TwoCaptcha, CaptchaKind::HCaptcha) => "HCaptchaTaskProxyless",
            (SolverProvider::TwoCaptcha, CaptchaKind::GeeTest) => "GeeTestTaskProxyless",
            (SolverProvider::TwoCaptcha, CaptchaKind::Turnstile) => "TurnstileTaskProxyless",
            (SolverProvider::CapSolver, CaptchaKind::RecaptchaV2) => "ReCaptchaV2TaskProxyLess",
            (SolverProvider::CapSolver, CaptchaKind::HCaptcha) => "HCaptchaTaskProxyLess",
            (SolverProvider::CapSolver, CaptchaKind::GeeTest) => "GeeTestTaskProxyLess",
            (SolverProvider::CapSolver, CaptchaKind::Turnstile) => "AntiTurnstileTaskProxyLess",
        }
    }
}

/// Solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptchaConfig {
    pub provider: SolverProvider,
    /// API key (can reference env var with ${VAR_NAME}).
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Refuse to solve below this balance.
    #[serde(default = "default_min_balance")]
    pub min_balance: f64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_min_balance() -> f64 {
    0.01
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_max_wait_secs() -> u64 {
    180
}

/// Client for 2Captcha / CapSolver task APIs.
pub struct TaskApiSolver {
    provider: SolverProvider,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_wait: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResponse {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    task_id: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<Value>,
    #[serde(default)]
    balance: Option<f64>,
}

impl TaskResponse {
    fn into_result(self) -> Result<Self, SolverError> {
        if self.error_id == 0 {
            return Ok(self);
        }
        let code = self.error_code.unwrap_or_else(|| self.error_id.to_string());
        if code.contains("ZERO_BALANCE") || code.contains("NO_FUNDS") {
            return Err(SolverError::InsufficientBalance);
        }
        if code.contains("KEY_DOES_NOT_EXIST") || code.contains("WRONG_USER_KEY") || code.contains("INVALID_KEY") {
            return Err(SolverError::NotConfigured(code));
        }
        Err(SolverError::Api {
            message: self.error_description.unwrap_or_default(),
            code,
        })
    }
}

impl TaskApiSolver {
    pub fn new(config: &CaptchaConfig) -> Result<Self, SolverError> {
        if config.api_key.trim().is_empty() {
            return Err(SolverError::NotConfigured(format!(
                "{} api_key is empty",
                config.provider.as_str()
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| config.provider.default_base_url().to_string()),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_wait: Duration::from_secs(config.max_wait_secs),
            client,
        })
    }

    fn task_body(&self, challenge: &CaptchaChallenge) -> Result<Value, SolverError> {
        let site_key = challenge.site_key.as_deref().ok_or_else(|| SolverError::Api {
            code: "NO_SITE_KEY".to_string(),
            message: format!("no site key found on {}", challenge.page_url),
        })?;
        let mut task = json!({
            "type": self.provider.task_type(challenge.kind),
            "websiteURL": challenge.page_url,
        });
        if challenge.kind == CaptchaKind::GeeTest {
            task["gt"] = json!(site_key);
        } else {
            task["websiteKey"] = json!(site_key);
        }
        Ok(json!({ "clientKey": self.api_key, "task": task }))
    }

    async fn call(&self, method: &str, body: &Value) -> Result<TaskResponse, SolverError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SolverError::Api {
                code: status.as_u16().to_string(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let parsed: TaskResponse = response.json().await?;
        parsed.into_result()
    }
}

/// Pull the token out of a solution object.
fn extract_token(solution: &Value) -> Option<String> {
    ["gRecaptchaResponse", "token", "captcha_output"]
        .iter()
        .find_map(|key| solution.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| solution.is_object().then(|| solution.to_string()))
}

#[async_trait]
impl CaptchaSolver for TaskApiSolver {
    fn provider(&self) -> &str {
        self.provider.as_str()
    }

    async fn get_balance(&self) -> Result<f64, SolverError> {
        let response = self
            .call("getBalance", &json!({ "clientKey": self.api_key }))
            .await?;
        response.balance.ok_or_else(|| SolverError::Api {
            code: "NO_BALANCE".to_string(),
            message: "balance missing from response".to_string(),
        })
    }

    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String, SolverError> {
        let created = self.call("createTask", &self.task_body(challenge)?).await?;
        let task_id = created.task_id.ok_or_else(|| SolverError::Api {
            code: "NO_TASK_ID".to_string(),
            message: "createTask returned no taskId".to_string(),
        })?;
        debug!(provider = self.provider(), task_id = %task_id, "CAPTCHA task created");

        let started = Instant::now();
        let poll = json!({ "clientKey": self.api_key, "taskId": task_id });
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let result = self.call("getTaskResult", &poll).await?;
            if result.status.as_deref() == Some("ready") {
                return result
                    .solution
                    .as_ref()
                    .and_then(extract_token)
                    .ok_or_else(|| SolverError::Api {
                        code: "NO_SOLUTION".to_string(),
                        message: "task ready without a solution".to_string(),
                    });
            }
            if started.elapsed() >= self.max_wait {
                return Err(SolverError::Timeout(self.max_wait));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: SolverProvider) -> CaptchaConfig {
        CaptchaConfig {
            provider,
            api_key: "key".to_string(),
            base_url: None,
            min_balance: 0.01,
            poll_interval_ms: 10,
            max_wait_secs: 1,
        }
    }

    fn challenge(kind: CaptchaKind) -> CaptchaChallenge {
        CaptchaChallenge {
            kind,
            page_url: "https://site.example/login".to_string(),
            site_key: Some("sitekey".to_string()),
            solver: None,
        }
    }

    #[test]
    fn test_task_body_per_provider() {
        let two = TaskApiSolver::new(&config(SolverProvider::TwoCaptcha)).unwrap();
        let body = two.task_body(&challenge(CaptchaKind::RecaptchaV2)).unwrap();
        assert_eq!(body["task"]["type"], "RecaptchaV2TaskProxyless");
        assert_eq!(body["task"]["websiteKey"], "sitekey");
        assert_eq!(body["clientKey"], "key");

        let cap = TaskApiSolver::new(&config(SolverProvider::CapSolver)).unwrap();
        let body = cap.task_body(&challenge(CaptchaKind::GeeTest)).unwrap();
        assert_eq!(body["task"]["type"], "GeeTestTaskProxyLess");
        assert_eq!(body["task"]["gt"], "sitekey");
        assert_eq!(cap.base_url, "https://api.capsolver.com");
    }

    #[test]
    fn test_missing_site_key() {
        let solver = TaskApiSolver::new(&config(SolverProvider::TwoCaptcha)).unwrap();
        let mut c = challenge(CaptchaKind::HCaptcha);
        c.site_key = None;
        assert!(solver.task_body(&c).is_err());
    }

    #[test]
    fn test_empty_key_is_not_configured() {
        let mut c = config(SolverProvider::TwoCaptcha);
        c.api_key = String::new();
        assert!(matches!(TaskApiSolver::new(&c), Err(SolverError::NotConfigured(_))));
    }

    #[test]
    fn test_error_codes() {
        let zero: TaskResponse =
            serde_json::from_str(r#"{"errorId": 1, "errorCode": "ERROR_ZERO_BALANCE"}"#).unwrap();
        assert!(matches!(zero.into_result(), Err(SolverError::InsufficientBalance)));

        let bad_key: TaskResponse =
            serde_json::from_str(r#"{"errorId": 1, "errorCode": "ERROR_KEY_DOES_NOT_EXIST"}"#)
                .unwrap();
        assert!(matches!(bad_key.into_result(), Err(SolverError::NotConfigured(_))));

        let ok: TaskResponse = serde_json::from_str(r#"{"errorId": 0, "balance": 2.5}"#).unwrap();
        assert_eq!(ok.into_result().unwrap().balance, Some(2.5));
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            extract_token(&json!({"gRecaptchaResponse": "03AGdBq"})).as_deref(),
            Some("03AGdBq")
        );
        assert_eq!(extract_token(&json!({"token": "0.abc"})).as_deref(), Some("0.abc"));
        let geetest = extract_token(&json!({"challenge": "c", "validate": "v"})).unwrap();
        assert!(geetest.contains("\"validate\":\"v\""));
    }

    #[test]
    fn test_provider_aliases() {
        let p: SolverProvider = serde_json::from_str("\"2captcha\"").unwrap();
        assert_eq!(p, SolverProvider::TwoCaptcha);
        let p: SolverProvider = serde_json::from_str("\"cap_solver\"").unwrap();
        assert_eq!(p, SolverProvider::CapSolver);
    }
}
