use tracing::debug;

use super::delimiters;
use super::markup::{self, Heading};
use super::model::{normalize_key, StageMap, StageNode};
use crate::config::ExtractOptions;

pub const RESULTS_LEVEL: usize = 2;
pub const STAGE_LEVEL: usize = 3;
pub const GROUP_LEVEL: usize = 4;

const RESULTS_TITLE: &str = "results";

/// A named slice of the results region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub name: String,
    pub body: &'a str,
}

/// One heading level's split: the text ahead of the first heading, then
/// one segment per heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split<'a> {
    pub lead: &'a str,
    pub segments: Vec<Segment<'a>>,
}

/// Text strictly after the first `==Results==` heading, up to the next
/// heading of the same or a shallower level.
pub fn locate_results(wikitext: &str) -> Option<&str> {
    let headings = markup::headings(wikitext);
    let idx = headings
        .iter()
        .position(|h| h.level == RESULTS_LEVEL && h.text.eq_ignore_ascii_case(RESULTS_TITLE))?;
    let start = headings[idx].span.end;
    let end = headings[idx + 1..]
        .iter()
        .find(|h| h.level <= RESULTS_LEVEL)
        .map_or(wikitext.len(), |h| h.span.start);
    Some(&wikitext[start..end])
}

/// Stages of the results region. Without stage headings the whole region
/// is one unnamed stage and its rounds land at the top level. Brackets
/// ahead of the first heading keep their rounds at the enclosing level.
pub fn split_results(region: &str, opts: &ExtractOptions) -> StageMap {
    let Some(stages) = split_level(region, STAGE_LEVEL, opts) else {
        debug!("No stage headings, treating results as a single stage");
        return delimiters::extract_region(region, opts);
    };

    let mut out = lead_rounds(stages.lead, opts);
    for stage in stages.segments {
        let node = match split_level(stage.body, GROUP_LEVEL, opts) {
            Some(groups) => {
                let mut sub = lead_rounds(groups.lead, opts);
                for g in groups.segments {
                    sub.insert(g.name, StageNode::Groups(delimiters::extract_region(g.body, opts)));
                }
                StageNode::Groups(sub)
            }
            None => StageNode::Groups(delimiters::extract_region(stage.body, opts)),
        };
        if node.match_count() == 0 {
            debug!("Stage {:?} has no matches", stage.name);
        }
        if out.get(&stage.name).is_some() {
            debug!("Duplicate stage {:?}, keeping the later one", stage.name);
        }
        out.insert(stage.name, node);
    }
    out
}

fn lead_rounds(lead: &str, opts: &ExtractOptions) -> StageMap {
    let rounds = delimiters::extract_region(lead, opts);
    if !rounds.is_empty() {
        debug!("Keeping {} rounds ahead of the first heading", rounds.len());
    }
    rounds
}

/// Split `text` at headings of exactly `level`. Directive-marker headings
/// (`==={{Stage|Playoffs}}===`) take precedence over plain ones; `None`
/// when neither kind is present.
pub fn split_level<'a>(text: &'a str, level: usize, opts: &ExtractOptions) -> Option<Split<'a>> {
    let headings = markup::headings(text);

    let marked: Vec<(&Heading, String)> = headings
        .iter()
        .filter(|h| h.level == level)
        .filter_map(|h| marker_name(&h.text, opts).map(|n| (h, n)))
        .collect();
    let chosen = if !marked.is_empty() {
        marked
    } else {
        headings
            .iter()
            .filter(|h| h.level == level && !h.text.starts_with("{{"))
            .map(|h| (h, h.text.clone()))
            .collect()
    };
    let first = chosen.first()?.0.span.start;

    let mut segments = Vec::with_capacity(chosen.len());
    for (k, (heading, raw_name)) in chosen.iter().enumerate() {
        let start = heading.span.end;
        let next_split = chosen.get(k + 1).map(|(h, _)| h.span.start);
        let next_shallower = headings
            .iter()
            .find(|h| h.span.start >= start && h.level < level)
            .map(|h| h.span.start);
        let end = [next_split, next_shallower]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(text.len());

        let name = normalize_key(raw_name);
        if name.is_empty() {
            continue;
        }
        segments.push(Segment {
            name,
            body: &text[start..end],
        });
    }

    Some(Split {
        lead: &text[..first],
        segments,
    })
}

/// `{{Stage|Name}}` (or another configured marker) as the whole heading text.
fn marker_name(heading: &str, opts: &ExtractOptions) -> Option<String> {
    let trimmed = heading.trim();
    if !trimmed.starts_with("{{") {
        return None;
    }
    let tpl = markup::parse_templates(trimmed).into_iter().next()?;
    if tpl.span.end != trimmed.len() || !opts.is_stage_marker(&tpl.name) {
        return None;
    }
    tpl.positional(1).map(|p| p.value()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ExtractOptions {
        ExtractOptions::default()
    }

    fn bracket(a: &str, b: &str) -> String {
        format!(
            "{{{{Bracket|Bracket/2|id=x\n<!-- Final -->\n|R1M1={{{{Match|opponent1={{{{TeamOpponent|{}}}}}|opponent2={{{{TeamOpponent|{}}}}}|score1=1|score2=0}}}}\n}}}}\n",
            a, b
        )
    }

    #[test]
    fn locate_stops_at_same_level() {
        let text = "==Participants==\nx\n==Results==\n===Playoffs===\nbody\n==Notes==\nno";
        assert_eq!(locate_results(text), Some("===Playoffs===\nbody\n"));
    }

    #[test]
    fn locate_is_case_insensitive_and_runs_to_end() {
        let text = "== RESULTS ==\nall of it\n===Deeper===\nstill";
        assert_eq!(locate_results(text), Some("all of it\n===Deeper===\nstill"));
    }

    #[test]
    fn locate_ignores_deeper_results_heading() {
        assert_eq!(locate_results("===Results===\nx"), None);
        assert_eq!(locate_results("no headings here"), None);
    }

    #[test]
    fn locate_stops_at_shallower_level() {
        let text = "==Results==\nbody\n=Top=\nafter";
        assert_eq!(locate_results(text), Some("body\n"));
    }

    #[test]
    fn marker_headings_take_precedence() {
        let text = "==={{Stage|Group Stage}}===\ng\n===Notes===\nn\n==={{Stage|Playoffs}}===\np\n";
        let segs = split_level(text, STAGE_LEVEL, &opts()).unwrap().segments;
        let names: Vec<&str> = segs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["group_stage", "playoffs"]);
        assert_eq!(segs[0].body, "g\n===Notes===\nn\n");
        assert_eq!(segs[1].body, "p\n");
    }

    #[test]
    fn plain_headings_when_no_markers() {
        let text = "intro\n===Group Stage===\ng\n===Playoffs===\np";
        let split = split_level(text, STAGE_LEVEL, &opts()).unwrap();
        let names: Vec<&str> = split.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["group_stage", "playoffs"]);
        assert_eq!(split.lead, "intro\n");
    }

    #[test]
    fn unknown_directive_heading_is_not_plain() {
        let text = "==={{Abbr|GS}}===\ng\n";
        assert!(split_level(text, STAGE_LEVEL, &opts()).is_none());
    }

    #[test]
    fn deeper_headings_do_not_split() {
        assert!(split_level("====Group A====\nx", STAGE_LEVEL, &opts()).is_none());
    }

    #[test]
    fn no_cross_stage_leakage() {
        let region = format!(
            "==={{{{Stage|Group Stage}}}}===\n{}==={{{{Stage|Playoffs}}}}===\n{}",
            bracket("OnlyInGroups", "X"),
            bracket("OnlyInPlayoffs", "Y")
        );
        let out = split_results(&region, &opts());
        let groups: Vec<String> = out.get("group_stage").unwrap().matches().iter().map(|m| m.opponent1.name.clone()).collect();
        let playoffs: Vec<String> = out.get("playoffs").unwrap().matches().iter().map(|m| m.opponent1.name.clone()).collect();
        assert_eq!(groups, vec!["OnlyInGroups"]);
        assert_eq!(playoffs, vec!["OnlyInPlayoffs"]);
    }

    #[test]
    fn sub_groups_nest_under_stage() {
        let region = format!(
            "===Group Stage===\n====Group A====\n{}====Group B====\n{}===Playoffs===\n",
            bracket("A1", "A2"),
            bracket("B1", "B2")
        );
        let out = split_results(&region, &opts());
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["group_stage", "playoffs"]);
        let Some(StageNode::Groups(groups)) = out.get("group_stage") else {
            panic!("group stage should hold sub-groups");
        };
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["group_a", "group_b"]);
        assert_eq!(groups.get("group_b").unwrap().matches()[0].opponent1.name, "B1");
        // empty stage keeps its slot
        assert_eq!(out.get("playoffs"), Some(&StageNode::Groups(StageMap::new())));
    }

    #[test]
    fn unnamed_stage_delegates_to_rounds() {
        let region = bracket("Solo", "Other");
        let out = split_results(&region, &opts());
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["final"]);
    }

    #[test]
    fn bracket_ahead_of_first_heading_is_kept() {
        let region = format!("{}===Notes===\nnothing", bracket("Pre", "X"));
        let out = split_results(&region, &opts());
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["final", "notes"]);
        assert_eq!(out.get("final").unwrap().matches()[0].opponent1.name, "Pre");
        assert_eq!(out.get("notes"), Some(&StageNode::Groups(StageMap::new())));
    }

    #[test]
    fn bracket_ahead_of_first_group_is_kept() {
        let region = format!(
            "===Group Stage===\n{}====Group A====\n{}",
            bracket("Opening", "X"),
            bracket("A1", "A2")
        );
        let out = split_results(&region, &opts());
        let Some(StageNode::Groups(groups)) = out.get("group_stage") else {
            panic!("group stage should hold sub-groups");
        };
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["final", "group_a"]);
        assert_eq!(groups.get("final").unwrap().matches()[0].opponent1.name, "Opening");
    }

    #[test]
    fn duplicate_stage_names_last_wins() {
        let region = format!("===Finals===\n{}===Finals===\n{}", bracket("First", "X"), bracket("Second", "Y"));
        let out = split_results(&region, &opts());
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("finals").unwrap().matches()[0].opponent1.name, "Second");
    }
}
