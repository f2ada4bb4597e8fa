//! Paid news search source (NewsAPI-compatible `/v2/everything`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Days;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::extract::extract_causes;
use super::http::{build_client, check_status, truncate};
use super::retry::{with_backoff, RetryConfig};
use super::{FetchContext, SourceCategory, SourceError, SourceFinding, SourceProvider};
use crate::candidate::Candidate;

const PAGE_SIZE: &str = "20";
const PAYLOAD_CHARS: usize = 4000;

pub struct NewsApiSource {
    id: String,
    category: SourceCategory,
    endpoint: String,
    api_key: String,
    window_days: u32,
    client: Client,
    retry: RetryConfig,
}

impl NewsApiSource {
    pub fn new(
        id: impl Into<String>,
        category: SourceCategory,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        window_days: u32,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, SourceError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SourceError::NotConfigured("news api key is empty".into()));
        }
        Ok(Self {
            id: id.into(),
            category,
            endpoint: endpoint.into(),
            api_key,
            window_days,
            client: build_client(timeout)?,
            retry,
        })
    }

    fn query_params(&self, candidate: &Candidate) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", format!("\"{}\"", candidate.name.trim())),
            ("language", "en".to_string()),
            ("sortBy", "relevancy".to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
        ];
        if let Some(death) = candidate.death_date {
            params.push(("from", death.to_string()));
            if let Some(to) = death.checked_add_days(Days::new(self.window_days as u64)) {
                params.push(("to", to.to_string()));
            }
        }
        params
    }
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl Article {
    fn text(&self) -> String {
        [&self.title, &self.description, &self.content]
            .into_iter()
            .flatten()
            .map(|s| s.trim().trim_end_matches('.'))
            .collect::<Vec<_>>()
            .join(". ")
    }
}

#[async_trait]
impl SourceProvider for NewsApiSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> SourceCategory {
        self.category
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        _ctx: &FetchContext,
    ) -> Result<Option<SourceFinding>, SourceError> {
        let params = self.query_params(candidate);
        debug!(source = %self.id, candidate = %candidate.id, "Searching news coverage");

        let params = &params;
        let body = with_backoff(&self.retry, &self.id, || async move {
            let response = self
                .client
                .get(&self.endpoint)
                .header("X-Api-Key", &self.api_key)
                .query(params)
                .send()
                .await?;
            let response = check_status(response).await?;
            Ok(response.text().await?)
        })
        .await?;

        let parsed: EverythingResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::MalformedResponse(format!("news search: {}", e)))?;

        Ok(finding_from_articles(&parsed.articles, &candidate.name))
    }
}

fn finding_from_articles(articles: &[Article], name: &str) -> Option<SourceFinding> {
    if articles.is_empty() {
        return None;
    }
    let texts: Vec<String> = articles.iter().map(Article::text).collect();
    let corpus = texts.join("\n");
    let causes = extract_causes(&corpus, Some(name));

    let url = causes.first().and_then(|top| {
        texts
            .iter()
            .zip(articles)
            .find(|(text, _)| text.to_lowercase().contains(&top.cause))
            .and_then(|(_, article)| article.url.clone())
    });

    Some(SourceFinding::from_candidates(
        causes,
        truncate(&corpus, PAYLOAD_CHARS),
        url,
    ))
}
