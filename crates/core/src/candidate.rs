//! Candidate records awaiting cause-of-death enrichment.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A person awaiting enrichment.
///
/// Supplied by an external selector and never mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable identifier in the record store.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Birth date, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    /// Death date, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_date: Option<NaiveDate>,
    /// Current popularity score (higher = more prominent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    /// Primary locale, e.g. "en-US".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Languages the person is associated with (ISO 639-1).
    #[serde(default)]
    pub languages: Vec<String>,
}

impl Candidate {
    /// Create a candidate with only the identity fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            birth_date: None,
            death_date: None,
            popularity: None,
            locale: None,
            languages: Vec::new(),
        }
    }

    pub fn with_birth_date(mut self, date: NaiveDate) -> Self {
        self.birth_date = Some(date);
        self
    }

    pub fn with_death_date(mut self, date: NaiveDate) -> Self {
        self.death_date = Some(date);
        self
    }

    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = Some(popularity);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Year of death, if known.
    pub fn death_year(&self) -> Option<i32> {
        self.death_date.map(|d| d.year())
    }

    /// Year of birth, if known.
    pub fn birth_year(&self) -> Option<i32> {
        self.birth_date.map(|d| d.year())
    }

    /// Popularity with a missing score treated as zero.
    pub fn popularity_or_zero(&self) -> f64 {
        self.popularity.unwrap_or(0.0)
    }

    /// Preferred language code for language-specific sources.
    ///
    /// Falls back to the locale prefix, then to English.
    pub fn preferred_language(&self) -> &str {
        if let Some(lang) = self.languages.first() {
            return lang.as_str();
        }
        self.locale
            .as_deref()
            .and_then(|l| l.split(['-', '_']).next())
            .filter(|l| !l.is_empty())
            .unwrap_or("en")
    }

    /// Short human description used in prompts and logs.
    pub fn describe(&self) -> String {
        let mut out = self.name.clone();
        match (self.birth_year(), self.death_year()) {
            (Some(b), Some(d)) => out.push_str(&format!(" ({}-{})", b, d)),
            (None, Some(d)) => out.push_str(&format!(" (d. {})", d)),
            (Some(b), None) => out.push_str(&format!(" (b. {})", b)),
            (None, None) => {}
        }
        out
    }
}
