//! Wikipedia article extract source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::extract::extract_causes;
use super::http::{build_client, check_status, truncate};
use super::retry::{with_backoff, RetryConfig};
use super::{FetchContext, SourceCategory, SourceError, SourceFinding, SourceProvider};
use crate::candidate::Candidate;

const PAYLOAD_CHARS: usize = 4000;

pub struct WikipediaSource {
    id: String,
    category: SourceCategory,
    api_base: String,
    client: Client,
    retry: RetryConfig,
}

impl WikipediaSource {
    pub fn new(
        id: impl Into<String>,
        category: SourceCategory,
        api_base: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            id: id.into(),
            category,
            api_base: api_base.into(),
            client: build_client(timeout)?,
            retry,
        })
    }

    fn article_url(&self, title: &str) -> String {
        let wiki_base = self
            .api_base
            .strip_suffix("/w/api.php")
            .unwrap_or("https://en.wikipedia.org");
        format!(
            "{}/wiki/{}",
            wiki_base,
            urlencoding::encode(&title.replace(' ', "_"))
        )
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    pageprops: Option<PageProps>,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    #[serde(default)]
    disambiguation: Option<String>,
}

impl Page {
    fn is_disambiguation(&self) -> bool {
        self.pageprops
            .as_ref()
            .map(|p| p.disambiguation.is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl SourceProvider for WikipediaSource {
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
        let title = candidate.name.trim();
        debug!(source = %self.id, title, "Fetching Wikipedia extract");

        let body = with_backoff(&self.retry, &self.id, || async move {
            let response = self
                .client
                .get(&self.api_base)
                .query(&[
                    ("action", "query"),
                    ("prop", "extracts|pageprops"),
                    ("explaintext", "1"),
                    ("redirects", "1"),
                    ("format", "json"),
                    ("formatversion", "2"),
                    ("titles", title),
                ])
                .send()
                .await?;
            let response = check_status(response).await?;
            Ok(response.text().await?)
        })
        .await?;

        let parsed: QueryResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::MalformedResponse(format!("extracts response: {}", e)))?;

        let Some(page) = parsed
            .query
            .and_then(|q| q.pages.into_iter().next())
            .filter(|p| !p.missing && !p.is_disambiguation())
        else {
            return Ok(None);
        };
        let Some(extract) = page.extract.as_deref().filter(|e| !e.trim().is_empty()) else {
            return Ok(None);
        };

        let causes = extract_causes(extract, Some(&candidate.name));
        Ok(Some(SourceFinding::from_candidates(
            causes,
            truncate(extract, PAYLOAD_CHARS),
            Some(self.article_url(&page.title)),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> WikipediaSource {
        WikipediaSource::new(
            "wikipedia",
            SourceCategory::Free,
            "https://en.wikipedia.org/w/api.php",
            Duration::from_secs(5),
            RetryConfig::none(),
        )
        .unwrap()
    }

    #[test]
    fn test_article_url() {
        assert_eq!(
            source().article_url("Jane Doe (actress)"),
            "https://en.wikipedia.org/wiki/Jane_Doe_%28actress%29"
        );
    }

    #[test]
    fn test_disambiguation_detection() {
        let parsed: QueryResponse = serde_json::from_str(
            r#"{"query": {"pages": [{"title": "John Smith", "extract": "John Smith may refer to:", "pageprops": {"disambiguation": ""}}]}}"#,
        )
        .unwrap();
        let page = parsed.query.unwrap().pages.into_iter().next().unwrap();
        assert!(page.is_disambiguation());
    }

    #[test]
    fn test_missing_page() {
        let parsed: QueryResponse = serde_json::from_str(
            r#"{"query": {"pages": [{"title": "Nobody Atall", "missing": true}]}}"#,
        )
        .unwrap();
        let page = parsed.query.unwrap().pages.into_iter().next().unwrap();
        assert!(page.missing);
        assert!(page.extract.is_none());
    }
}
