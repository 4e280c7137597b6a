use tracing::debug;

use crate::config::{ExtractOptions, UnresolvedPolicy};
use crate::parser::markup::{Param, Template};
use crate::parser::model::{Match, Opponent};

const MAX_MAPS: usize = 5;
const MAX_OVERTIMES: usize = 4;
const TRUTHY: &[&str] = &["true", "t", "yes", "y", "1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    One,
    Two,
}

/// Resolve one `{{Match}}` directive. `None` means the match was dropped
/// because neither opponent could be identified.
pub fn resolve(tpl: &Template, opts: &ExtractOptions) -> Option<Match> {
    let mut name1 = opponent_name(tpl.get("opponent1"), opts);
    let mut name2 = opponent_name(tpl.get("opponent2"), opts);

    if name1.is_empty() && name2.is_empty() {
        match opts.unresolved_opponents {
            UnresolvedPolicy::Drop => {
                debug!("Dropping match at {:?}: no opponent resolved", tpl.span);
                return None;
            }
            UnresolvedPolicy::Placeholder => {
                name1 = opts.placeholder_name.clone();
                name2 = opts.placeholder_name.clone();
            }
        }
    }

    let (score1, score2) = resolve_scores(tpl, opts);
    let winner = match score1.cmp(&score2) {
        std::cmp::Ordering::Greater => Some(name1.clone()),
        std::cmp::Ordering::Less => Some(name2.clone()),
        std::cmp::Ordering::Equal => None,
    }
    .filter(|w| !w.is_empty());

    Some(Match {
        opponent1: Opponent { name: name1, score: score1 },
        opponent2: Opponent { name: name2, score: score2 },
        winner,
    })
}

/// First opponent-family directive inside the parameter, read by its first
/// positional or `name` argument; otherwise the raw text itself.
fn opponent_name(param: Option<&Param>, opts: &ExtractOptions) -> String {
    let Some(param) = param else {
        return String::new();
    };
    match param.find_templates(|t| opts.is_opponent(&t.name)).first() {
        Some(t) => t
            .positional(1)
            .map(Param::value)
            .filter(|v| !v.is_empty())
            .or_else(|| t.value("name"))
            .unwrap_or_default(),
        None => param.value(),
    }
}

/// Tiered: walkover markers, then explicit numeric scores, then map tally.
fn resolve_scores(tpl: &Template, opts: &ExtractOptions) -> (u32, u32) {
    let s1 = explicit_score(tpl, 1, opts);
    let s2 = explicit_score(tpl, 2, opts);

    if let Some(side) = walkover(tpl, &s1, &s2, opts) {
        return match side {
            Side::One => (1, 0),
            Side::Two => (0, 1),
        };
    }

    if let (Some(a), Some(b)) = (parse_count(&s1), parse_count(&s2)) {
        return (a, b);
    }
    if !s1.is_empty() || !s2.is_empty() {
        debug!("Explicit scores {:?}/{:?} not numeric, tallying maps", s1, s2);
    }

    map_tally(tpl)
}

/// `scoreN` on the match, else the `score` argument of the opponent directive.
fn explicit_score(tpl: &Template, n: usize, opts: &ExtractOptions) -> String {
    if let Some(v) = tpl.value(&format!("score{}", n)) {
        return v;
    }
    tpl.get(&format!("opponent{}", n))
        .and_then(|p| p.find_templates(|t| opts.is_opponent(&t.name)).into_iter().next())
        .and_then(|t| t.value("score"))
        .unwrap_or_default()
}

/// Walkover winner, if exactly one side is marked as such. Markers that
/// point both ways (double forfeit) decide nothing.
fn walkover(tpl: &Template, s1: &str, s2: &str, opts: &ExtractOptions) -> Option<Side> {
    let one = opts.is_win_marker(s1) || opts.is_forfeit_marker(s2);
    let two = opts.is_win_marker(s2) || opts.is_forfeit_marker(s1);
    match (one, two) {
        (true, false) => return Some(Side::One),
        (false, true) => return Some(Side::Two),
        (true, true) => {
            debug!("Contradictory walkover markers {:?}/{:?} at {:?}", s1, s2, tpl.span);
            return None;
        }
        (false, false) => {}
    }
    match tpl.value("walkover").as_deref() {
        Some("1") => Some(Side::One),
        Some("2") => Some(Side::Two),
        _ => None,
    }
}

/// Purely numeric field; anything else is `None`.
fn parse_count(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Count maps won per side over finished `map1..map5`.
fn map_tally(tpl: &Template) -> (u32, u32) {
    let mut won = (0, 0);

    for i in 1..=MAX_MAPS {
        let key = format!("map{}", i);
        let Some(map) = tpl
            .get(&key)
            .and_then(|p| p.find_templates(|t| t.is("map")).into_iter().next())
        else {
            continue;
        };
        if !is_truthy(map.value("finished").as_deref().unwrap_or("")) {
            continue;
        }
        let Some((r1, r2)) = map_rounds(&map) else {
            debug!("Skipping {} at {:?}: non-numeric round field", key, map.span);
            continue;
        };
        if r1 > r2 {
            won.0 += 1;
        } else if r2 > r1 {
            won.1 += 1;
        }
    }

    won
}

/// Round totals for each side: both halves of regulation plus every
/// overtime period. Missing fields count as zero.
fn map_rounds(map: &Template) -> Option<(u32, u32)> {
    let mut keys1 = vec!["t1t".to_string(), "t1ct".to_string()];
    let mut keys2 = vec!["t2t".to_string(), "t2ct".to_string()];
    for ot in 1..=MAX_OVERTIMES {
        keys1.push(format!("o{}t1t", ot));
        keys1.push(format!("o{}t1ct", ot));
        keys2.push(format!("o{}t2t", ot));
        keys2.push(format!("o{}t2ct", ot));
    }

    let sum = |keys: &[String]| -> Option<u32> {
        keys.iter().try_fold(0u32, |acc, k| match map.value(k) {
            None => Some(acc),
            Some(v) => parse_count(&v).map(|n| acc.saturating_add(n)),
        })
    };

    Some((sum(&keys1)?, sum(&keys2)?))
}

fn is_truthy(s: &str) -> bool {
    TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(s.trim()))
}
