use thiserror::Error;

/// Failures at the retrieval and configuration boundary. The extraction
/// engine itself never fails; malformed markup degrades to partial output.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Search returned no candidate pages
    #[error("No search results for '{query}'")]
    NotFound { query: String },

    /// Page exists in the search index but has no retrievable content
    #[error("No content for page '{title}'")]
    NoContent { title: String },

    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed API response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

impl ScrapeError {
    /// True for the two "nothing to extract" conditions the caller should
    /// report as not-found rather than as a transport failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScrapeError::NotFound { .. } | ScrapeError::NoContent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(ScrapeError::NotFound { query: "x".into() }.is_not_found());
        assert!(ScrapeError::NoContent { title: "x".into() }.is_not_found());
        assert!(!ScrapeError::RateLimited { attempts: 3 }.is_not_found());
    }

    #[test]
    fn messages() {
        let e = ScrapeError::NotFound { query: "VCT 2025".into() };
        assert_eq!(e.to_string(), "No search results for 'VCT 2025'");
    }
}
