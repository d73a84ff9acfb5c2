use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::error::SearchError;

use super::matcher::{ExerciseRecord, ExerciseSearch};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// 配列そのもの、または `{"results": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    List(Vec<ExerciseRecord>),
    Wrapped { results: Vec<ExerciseRecord> },
}

/// HTTP のエクササイズ検索 API
///
/// `GET {base_url}/exercises/search?q=...`
pub struct HttpExerciseSearch {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpExerciseSearch {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/exercises/search", self.base_url)
    }
}

impl ExerciseSearch for HttpExerciseSearch {
    fn search(&self, query: &str) -> Result<Vec<ExerciseRecord>, SearchError> {
        let mut request = self.client.get(self.endpoint()).query(&[("q", query)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| SearchError::Transport(e.to_string()))?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SearchError::Unauthorized),
            status if status.is_success() => {
                let body: SearchResponse = response.json().map_err(|e| SearchError::Transport(e.to_string()))?;
                Ok(match body {
                    SearchResponse::List(records) => records,
                    SearchResponse::Wrapped { results } => results,
                })
            }
            status => Err(SearchError::Transport(format!("unexpected status: {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_slash() {
        let search = HttpExerciseSearch::new("http://localhost:8080/", None).unwrap();
        assert_eq!(search.endpoint(), "http://localhost:8080/exercises/search");
    }

    #[test]
    fn test_wrapped_response() {
        let body: SearchResponse = serde_json::from_str(r#"{"results": [{"name": "Squat"}]}"#).unwrap();
        match body {
            SearchResponse::Wrapped { results } => assert_eq!(results[0].name, "Squat"),
            SearchResponse::List(_) => panic!("expected wrapped response"),
        }
    }
}
