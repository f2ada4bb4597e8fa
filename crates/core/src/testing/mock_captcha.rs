//! Mock CAPTCHA solver for testing.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::browser::{CaptchaChallenge, CaptchaSolver, SolverError};

/// Mock implementation of the CaptchaSolver trait.
///
/// Every challenge is solved with a fixed token unless the balance is below
/// zero, in which case solving fails with `InsufficientBalance`.
#[derive(Debug)]
pub struct MockCaptchaSolver {
    balance: Mutex<f64>,
    token: String,
    solved: Mutex<Vec<CaptchaChallenge>>,
}

impl MockCaptchaSolver {
    pub fn new(balance: f64) -> Self {
        Self {
            balance: Mutex::new(balance),
            token: "mock-captcha-token".to_string(),
            solved: Mutex::new(Vec::new()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn set_balance(&self, balance: f64) {
        *self.balance.lock().unwrap_or_else(|e| e.into_inner()) = balance;
    }

    /// Challenges solved so far.
    pub fn solved(&self) -> Vec<CaptchaChallenge> {
        self.solved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CaptchaSolver for MockCaptchaSolver {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn get_balance(&self) -> Result<f64, SolverError> {
        Ok(*self.balance.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String, SolverError> {
        if *self.balance.lock().unwrap_or_else(|e| e.into_inner()) < 0.0 {
            return Err(SolverError::InsufficientBalance);
        }
        self.solved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(challenge.clone());
        Ok(self.token.clone())
    }
}
