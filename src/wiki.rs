use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, ScrapeError};

const API_BASE: &str = "https://liquipedia.net";
const USER_AGENT: &str = concat!("tourney_scraper/", env!("CARGO_PKG_VERSION"), " (tournament data extraction)");
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub pageid: i64,
}

/// Raw page as returned by the wiki, plus the identifiers it was found by.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub game: String,
    pub query: String,
    pub title: String,
    pub pageid: i64,
    pub content: String,
}

pub struct WikiClient {
    http: reqwest::Client,
    api_url: String,
}

impl WikiClient {
    /// Client for one wiki, e.g. `valorant` → `https://liquipedia.net/valorant/api.php`.
    pub fn new(game: &str) -> Result<Self> {
        Self::with_api_url(format!("{}/{}/api.php", API_BASE, game.trim_matches('/')))
    }

    pub fn with_api_url(api_url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, api_url })
    }

    /// Keyword search, best match first.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let body = self
            .get_json(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        parse_search_response(&body)
    }

    /// Current wikitext of the page with exactly this title.
    pub async fn page_content(&self, title: &str) -> Result<String> {
        let body = self
            .get_json(&[
                ("action", "query"),
                ("prop", "revisions"),
                ("rvprop", "content"),
                ("rvslots", "main"),
                ("titles", title),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        parse_content_response(&body).ok_or_else(|| ScrapeError::NoContent {
            title: title.to_string(),
        })
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<Value> {
        for attempt in 0..=MAX_RETRIES {
            let response = self.http.get(&self.api_url).query(params).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.json::<Value>().await?);
            }

            let retryable = status.as_u16() == 429 || status.is_server_error();
            if !retryable || attempt == MAX_RETRIES {
                if status.as_u16() == 429 {
                    return Err(ScrapeError::RateLimited { attempts: attempt + 1 });
                }
                return Err(ScrapeError::Status {
                    status: status.as_u16(),
                    url: self.api_url.clone(),
                });
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            warn!(
                "HTTP {} from {} (attempt {}/{}), backing off {:.1}s",
                status,
                self.api_url,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }

        Err(ScrapeError::RateLimited { attempts: MAX_RETRIES + 1 })
    }
}

/// Search the wiki for `query`, then fetch the top hit's wikitext.
pub async fn lookup(game: &str, query: &str) -> Result<FetchedPage> {
    let client = WikiClient::new(game)?;

    info!("Searching {} for '{}'", game, query);
    let hits = client.search(query).await?;
    let top = hits.into_iter().next().ok_or_else(|| ScrapeError::NotFound {
        query: query.to_string(),
    })?;

    info!("Fetching '{}' (pageid {})", top.title, top.pageid);
    let content = client.page_content(&top.title).await?;

    Ok(FetchedPage {
        game: game.to_string(),
        query: query.to_string(),
        title: top.title,
        pageid: top.pageid,
        content,
    })
}

/// `query.search[]` of a search response; a missing list is empty.
pub fn parse_search_response(body: &Value) -> Result<Vec<SearchHit>> {
    match body.pointer("/query/search") {
        Some(list) => Ok(serde_json::from_value(list.clone())?),
        None => Ok(Vec::new()),
    }
}

/// Wikitext of the first page in a revisions response, in either the slot
/// layout or the legacy flat layout. `None` for missing pages.
pub fn parse_content_response(body: &Value) -> Option<String> {
    let page = body.pointer("/query/pages/0")?;
    if page.get("missing").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let revision = page.pointer("/revisions/0")?;
    revision
        .pointer("/slots/main/content")
        .or_else(|| revision.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_hits_in_rank_order() {
        let body = json!({
            "batchcomplete": true,
            "query": {
                "searchinfo": { "totalhits": 2 },
                "search": [
                    { "ns": 0, "title": "VCT/2025/Game Changers/Latin America North/Main Event", "pageid": 1001, "size": 9000 },
                    { "ns": 0, "title": "VCT/2025/Game Changers/Latin America North", "pageid": 1000, "size": 4000 }
                ]
            }
        });
        let hits = parse_search_response(&body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].pageid, 1001);
        assert!(hits[0].title.ends_with("Main Event"));
    }

    #[test]
    fn empty_search() {
        let body = json!({ "query": { "search": [] } });
        assert!(parse_search_response(&body).unwrap().is_empty());
        assert!(parse_search_response(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn malformed_search_is_an_error() {
        let body = json!({ "query": { "search": [ { "title": 5 } ] } });
        assert!(matches!(parse_search_response(&body), Err(ScrapeError::Json(_))));
    }

    #[test]
    fn content_flat_layout() {
        let body = json!({
            "query": { "pages": [ { "pageid": 1, "title": "T", "revisions": [ { "content": "==Results==" } ] } ] }
        });
        assert_eq!(parse_content_response(&body).as_deref(), Some("==Results=="));
    }

    #[test]
    fn content_slot_layout() {
        let body = json!({
            "query": { "pages": [ { "pageid": 1, "title": "T", "revisions": [
                { "slots": { "main": { "contentmodel": "wikitext", "content": "{{TeamCard}}" } } }
            ] } ] }
        });
        assert_eq!(parse_content_response(&body).as_deref(), Some("{{TeamCard}}"));
    }

    #[test]
    fn missing_page() {
        let body = json!({ "query": { "pages": [ { "title": "Nope", "missing": true } ] } });
        assert_eq!(parse_content_response(&body), None);
        assert_eq!(parse_content_response(&json!({ "query": {} })), None);
    }

    #[test]
    fn api_url_per_game() {
        let client = WikiClient::new("valorant").unwrap();
        assert_eq!(client.api_url, "https://liquipedia.net/valorant/api.php");
    }
}
