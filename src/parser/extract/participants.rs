use crate::config::ExtractOptions;
use crate::parser::markup::{self, Template};
use crate::parser::model::Team;

const MAX_PLAYERS: usize = 5;

/// One team per roster card anywhere in the document, in document order.
pub fn extract(wikitext: &str, opts: &ExtractOptions) -> Vec<Team> {
    markup::find_templates(wikitext, |t| opts.is_roster(&t.name))
        .iter()
        .map(team_from_card)
        .collect()
}

fn team_from_card(card: &Template) -> Team {
    // p1..p5 in order; absent or blank slots are skipped, not padded
    let players = (1..=MAX_PLAYERS)
        .filter_map(|i| card.value(&format!("p{}", i)))
        .collect();

    Team {
        name: card.value("team").unwrap_or_default(),
        players,
        coach: card.value("c").or_else(|| card.value("coach")),
        qualifier: card.value("qualifier").unwrap_or_default(),
    }
}
