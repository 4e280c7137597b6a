//! Round/stage boundaries inside a single bracket construct.
//!
//! Pass one lexes every candidate boundary (top-level comments and
//! `R<n>[M<n>]header` / `M<n>header` parameters) with its byte range. Pass two collapses a
//! header that is immediately restated by a comment, then assigns each
//! bracket parameter to the boundary preceding it. Brackets with no
//! boundaries at all fall back to grouping `R<n>...` parameters by round;
//! a matchlist's bare `M<n>` parameters form a single round.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::extract::matches;
use super::markup::{self, Param, ParamKey, Template};
use super::model::{normalize_key, Match, StageMap, StageNode};
use crate::config::ExtractOptions;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:R\d+(?:M\d+)?|M\d+)header$").unwrap());
static ROUND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^R(\d+)").unwrap());
static LIST_MATCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^M\d+$").unwrap());

const MATCH_TOKEN: &str = "match";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterKind {
    Comment,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter {
    pub name: String,
    pub span: Range<usize>,
    pub kind: DelimiterKind,
}

/// Extract every bracket construct in `region`. Later brackets overwrite
/// same-named rounds of earlier ones. No bracket yields an empty map.
pub fn extract_region(region: &str, opts: &ExtractOptions) -> StageMap {
    let brackets = markup::find_templates(region, |t| opts.is_bracket(&t.name));
    if brackets.is_empty() {
        debug!("No bracket construct in region of {} bytes", region.len());
    }

    let mut out = StageMap::new();
    for bracket in &brackets {
        out.extend(extract_bracket(region, bracket, opts));
    }
    out
}

pub fn extract_bracket(text: &str, bracket: &Template, opts: &ExtractOptions) -> StageMap {
    let delimiters = collapse(text, lex(text, bracket));
    if delimiters.is_empty() {
        return structural_rounds(bracket, opts);
    }

    let body_end = bracket.span.end.saturating_sub(2);
    let mut out = StageMap::new();

    for (i, delim) in delimiters.iter().enumerate() {
        let name = normalize_key(&delim.name);
        if name.is_empty() {
            continue;
        }
        let segment = delim.span.end..delimiters.get(i + 1).map_or(body_end, |d| d.span.start);
        let found: Vec<Match> = bracket
            .params
            .iter()
            .filter(|p| segment.contains(&p.span.start) && holds_match(p))
            .flat_map(|p| resolve_matches(p, opts))
            .collect();
        out.insert(name, StageNode::Matches(found));
    }

    out
}

/// Pass one: all boundary candidates sorted by position. Comments nested in
/// a match (or any other inner directive) are not boundaries.
pub fn lex(text: &str, bracket: &Template) -> Vec<Delimiter> {
    let inner: Vec<Range<usize>> = bracket
        .params
        .iter()
        .filter(|p| p.raw.contains("{{"))
        .flat_map(|p| p.templates())
        .map(|t| t.span)
        .collect();

    let base = bracket.span.start;
    let mut out: Vec<Delimiter> = markup::comments(&text[bracket.span.clone()])
        .into_iter()
        .map(|c| Delimiter {
            name: c.text,
            span: c.span.start + base..c.span.end + base,
            kind: DelimiterKind::Comment,
        })
        .filter(|d| !inner.iter().any(|r| r.contains(&d.span.start)))
        .collect();

    for p in &bracket.params {
        let Some(key) = p.name() else { continue };
        if !HEADER_RE.is_match(key) {
            continue;
        }
        // label ends where trailing comments begin
        let label_end = p
            .raw
            .find("<!--")
            .map_or(p.value_span.end, |i| p.value_span.start + i);
        out.push(Delimiter {
            name: p.value(),
            span: p.span.start..label_end,
            kind: DelimiterKind::Header,
        });
    }

    out.sort_by_key(|d| d.span.start);
    out
}

/// Pass two: a header followed by a comment with no match content between
/// them marks one boundary, not two; keep the header.
pub fn collapse(text: &str, delimiters: Vec<Delimiter>) -> Vec<Delimiter> {
    let mut out: Vec<Delimiter> = Vec::with_capacity(delimiters.len());
    for d in delimiters {
        if let Some(prev) = out.last() {
            let restated = prev.kind == DelimiterKind::Header
                && d.kind == DelimiterKind::Comment
                && !contains_match(gap(text, prev.span.end, d.span.start));
            if restated {
                debug!("Collapsing comment {:?} into header {:?}", d.name, prev.name);
                continue;
            }
        }
        out.push(d);
    }
    out
}

/// No boundaries anywhere: group `R<n>...` parameters by round number, named
/// by `R<n>-name` when present, else by the configured round table. Bare
/// `M<n>` parameters count as round 1, which a matchlist `title` may name.
fn structural_rounds(bracket: &Template, opts: &ExtractOptions) -> StageMap {
    let mut rounds: Vec<(u32, Vec<Match>)> = Vec::new();
    let mut listed = false;

    for p in &bracket.params {
        let ParamKey::Named(key) = &p.key else { continue };
        let lower = key.to_ascii_lowercase();
        if lower.ends_with("-name") || lower.ends_with("header") {
            continue;
        }
        let round = if LIST_MATCH_RE.is_match(key) {
            listed = true;
            1
        } else {
            let Some(round) = ROUND_RE
                .captures(key)
                .and_then(|c| c[1].parse::<u32>().ok())
            else {
                continue;
            };
            round
        };
        if !holds_match(p) {
            continue;
        }
        let found = resolve_matches(p, opts);
        match rounds.iter_mut().find(|(n, _)| *n == round) {
            Some((_, list)) => list.extend(found),
            None => rounds.push((round, found)),
        }
    }

    let mut out = StageMap::new();
    for (round, found) in rounds {
        let label = bracket
            .get_ignore_case(&format!("R{}-name", round))
            .or_else(|| bracket.get("title").filter(|_| listed && round == 1))
            .map(|p| normalize_key(&p.value()))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| opts.round_label(round));
        out.insert(label, StageNode::Matches(found));
    }
    out
}

fn resolve_matches(param: &Param, opts: &ExtractOptions) -> Vec<Match> {
    param
        .find_templates(|t| t.is(MATCH_TOKEN))
        .iter()
        .filter_map(|t| matches::resolve(t, opts))
        .collect()
}

fn holds_match(p: &Param) -> bool {
    contains_match(&p.raw)
}

fn contains_match(s: &str) -> bool {
    s.to_ascii_lowercase().contains(MATCH_TOKEN)
}

fn gap(text: &str, from: usize, to: usize) -> &str {
    if from < to {
        text.get(from..to).unwrap_or("")
    } else {
        ""
    }
}
