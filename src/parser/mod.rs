pub mod delimiters;
pub mod extract;
pub mod markup;
pub mod model;
pub mod sections;

use tracing::debug;

use crate::config::ExtractOptions;
use crate::db::{ExtractionRow, StoredPage};
use model::{StageMap, TournamentData};

/// Full pipeline: rosters from the whole document, results from the
/// `==Results==` region split into stages, groups and rounds.
pub fn extract_tournament(wikitext: &str, opts: &ExtractOptions) -> TournamentData {
    let participants = extract::participants::extract(wikitext, opts);

    let mut results = match sections::locate_results(wikitext) {
        Some(region) => sections::split_results(region, opts),
        None => {
            debug!("No results section found");
            StageMap::new()
        }
    };
    if !opts.keep_empty_stages {
        results.prune_empty();
    }

    TournamentData {
        participants,
        results,
    }
}

/// Extract one archived page into its storable row.
pub fn process_page(page: &StoredPage, opts: &ExtractOptions) -> ExtractionRow {
    debug!("Extracting {}/{} (pageid {})", page.game, page.title, page.pageid);
    let data = extract_tournament(&page.wikitext, opts);
    ExtractionRow {
        page_id: page.id,
        teams: data.participants.len(),
        matches: data.results.match_count(),
        data_json: serde_json::to_string(&data).unwrap_or_default(),
    }
}
