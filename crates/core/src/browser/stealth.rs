//! Fingerprint masking and human-like pacing.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const USER_AGENTS: &[(&str, &str, &str)] = &[
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"",
        "\"Windows\"",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"",
        "\"macOS\"",
    ),
    (
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "\"Chromium\";v=\"123\", \"Google Chrome\";v=\"123\", \"Not:A-Brand\";v=\"8\"",
        "\"Linux\"",
    ),
];

const VIEWPORTS: &[(u32, u32)] = &[(1920, 1080), (1536, 864), (1440, 900), (1366, 768)];

/// Pacing limits, configurable globally (never per site).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StealthConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_min_delay_ms() -> u64 {
    400
}

fn default_max_delay_ms() -> u64 {
    1800
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            locale: default_locale(),
            timezone: default_timezone(),
        }
    }
}

/// The fingerprint presented by one browser context.
#[derive(Debug, Clone, PartialEq)]
pub struct StealthProfile {
    pub user_agent: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_platform: String,
    pub accept_language: String,
    pub locale: String,
    pub timezone: String,
    pub viewport: (u32, u32),
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl StealthProfile {
    /// Pick a plausible desktop fingerprint.
    pub fn random(config: &StealthConfig) -> Self {
        let mut rng = rand::thread_rng();
        let (ua, ch, platform) = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        let viewport = VIEWPORTS.choose(&mut rng).copied().unwrap_or((1920, 1080));
        Self::build(config, ua, ch, platform, viewport)
    }

    /// Deterministic profile (first user agent, no delays).
    pub fn fixed() -> Self {
        let config = StealthConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..StealthConfig::default()
        };
        let (ua, ch, platform) = USER_AGENTS[0];
        Self::build(&config, ua, ch, platform, VIEWPORTS[0])
    }

    fn build(
        config: &StealthConfig,
        ua: &str,
        ch: &str,
        platform: &str,
        viewport: (u32, u32),
    ) -> Self {
        let language = config.locale.split('-').next().unwrap_or("en");
        let min = config.min_delay_ms.min(config.max_delay_ms);
        Self {
            user_agent: ua.to_string(),
            sec_ch_ua: ch.to_string(),
            sec_ch_ua_platform: platform.to_string(),
            accept_language: format!("{},{};q=0.9", config.locale, language),
            locale: config.locale.clone(),
            timezone: config.timezone.clone(),
            viewport,
            min_delay: Duration::from_millis(min),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Headers every request from this context carries.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("user-agent", self.user_agent.clone()),
            ("accept-language", self.accept_language.clone()),
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            ),
            ("sec-ch-ua", self.sec_ch_ua.clone()),
            ("sec-ch-ua-mobile", "?0".to_string()),
            ("sec-ch-ua-platform", self.sec_ch_ua_platform.clone()),
            ("upgrade-insecure-requests", "1".to_string()),
        ]
    }

    /// Scripts a JavaScript-capable engine runs before any page script.
    pub fn init_scripts(&self) -> Vec<String> {
        let language = self.locale.split('-').next().unwrap_or("en");
        vec![
            "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });".to_string(),
            format!(
                "Object.defineProperty(navigator, 'languages', {{ get: () => ['{}', '{}'] }});",
                self.locale, language
            ),
            "Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });"
                .to_string(),
            "window.chrome = window.chrome || { runtime: {} };".to_string(),
        ]
    }

    /// A jittered pause between min and max delay.
    pub fn next_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Sleep like a human between actions.
    pub async fn human_delay(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_profile_is_consistent() {
        let profile = StealthProfile::random(&StealthConfig::default());
        assert!(USER_AGENTS.iter().any(|(ua, _, _)| *ua == profile.user_agent));
        assert_eq!(profile.accept_language, "en-US,en;q=0.9");
        let headers = profile.headers();
        assert!(headers
            .iter()
            .any(|(k, v)| *k == "user-agent" && v == &profile.user_agent));
    }

    #[test]
    fn test_delay_within_bounds() {
        let profile = StealthProfile::random(&StealthConfig {
            min_delay_ms: 100,
            max_delay_ms: 200,
            ..StealthConfig::default()
        });
        for _ in 0..50 {
            let d = profile.next_delay();
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_fixed_profile_has_no_delay() {
        let profile = StealthProfile::fixed();
        assert_eq!(profile.next_delay(), Duration::ZERO);
        assert!(profile.init_scripts()[0].contains("webdriver"));
    }
}
