use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--(.*?)-->").unwrap());

/// Key of a template parameter: `{{T|a|b}}` yields positional 1 and 2,
/// `{{T|team=X}}` yields named `team`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKey {
    Positional(usize),
    Named(String),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub key: ParamKey,
    /// Value text exactly as written, comments and whitespace included.
    pub raw: String,
    /// Whole parameter (key, `=`, value) without the leading `|`.
    pub span: Range<usize>,
    pub value_span: Range<usize>,
}

impl Param {
    /// Value with comments removed and surrounding whitespace trimmed.
    pub fn value(&self) -> String {
        strip_comments(&self.raw).trim().to_string()
    }

    /// Re-parse the value into templates on demand. Spans stay in the
    /// coordinates of the document the parent template came from.
    pub fn templates(&self) -> Vec<Template> {
        parse_templates(&self.raw)
            .into_iter()
            .map(|t| t.shifted(self.value_span.start))
            .collect()
    }

    /// Same as [`Param::templates`], but also descends into nested values.
    pub fn find_templates(&self, pred: impl Fn(&Template) -> bool) -> Vec<Template> {
        let mut out = Vec::new();
        walk(&self.raw, self.value_span.start, &pred, &mut out);
        out
    }

    pub fn name(&self) -> Option<&str> {
        match &self.key {
            ParamKey::Named(n) => Some(n),
            ParamKey::Positional(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    /// Normalized name: trimmed, lower-case, `_` folded to space.
    pub name: String,
    pub params: Vec<Param>,
    pub span: Range<usize>,
}

impl Template {
    pub fn is(&self, name: &str) -> bool {
        self.name == normalize_name(name)
    }

    /// Named parameter lookup. MediaWiki lets a later duplicate win.
    pub fn get(&self, key: &str) -> Option<&Param> {
        self.params
            .iter()
            .rev()
            .find(|p| matches!(&p.key, ParamKey::Named(n) if n == key))
    }

    pub fn get_ignore_case(&self, key: &str) -> Option<&Param> {
        self.params
            .iter()
            .rev()
            .find(|p| matches!(&p.key, ParamKey::Named(n) if n.eq_ignore_ascii_case(key)))
    }

    /// Positional lookup; an explicit `1=` counts as positional 1.
    pub fn positional(&self, n: usize) -> Option<&Param> {
        let explicit = n.to_string();
        self.params.iter().rev().find(|p| match &p.key {
            ParamKey::Positional(i) => *i == n,
            ParamKey::Named(k) => *k == explicit,
        })
    }

    /// Trimmed value of a named parameter, `None` when absent or blank.
    pub fn value(&self, key: &str) -> Option<String> {
        self.get(key).map(Param::value).filter(|v| !v.is_empty())
    }

    fn shifted(mut self, offset: usize) -> Self {
        self.span = self.span.start + offset..self.span.end + offset;
        for p in &mut self.params {
            p.span = p.span.start + offset..p.span.end + offset;
            p.value_span = p.value_span.start + offset..p.value_span.end + offset;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    /// Whole heading line, trailing newline included.
    pub span: Range<usize>,
}

pub fn normalize_name(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn strip_comments(text: &str) -> String {
    COMMENT_RE.replace_all(text, "").into_owned()
}

/// Top-level templates of `text`, in document order.
pub fn parse_templates(text: &str) -> Vec<Template> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i..].starts_with(b"<!--") {
            i = skip_comment(bytes, i);
            continue;
        }
        if bytes[i..].starts_with(b"{{") {
            if let Some(t) = parse_template_at(text, i) {
                i = t.span.end;
                out.push(t);
                continue;
            }
        }
        i += 1;
    }

    out
}

/// Every template in `text` matching `pred`, nested ones included,
/// depth-first in document order.
pub fn find_templates(text: &str, pred: impl Fn(&Template) -> bool) -> Vec<Template> {
    let mut out = Vec::new();
    walk(text, 0, &pred, &mut out);
    out
}

fn walk(text: &str, offset: usize, pred: &dyn Fn(&Template) -> bool, out: &mut Vec<Template>) {
    for t in parse_templates(text) {
        let t = t.shifted(offset);
        let nested: Vec<(String, usize)> = t
            .params
            .iter()
            .filter(|p| p.raw.contains("{{"))
            .map(|p| (p.raw.clone(), p.value_span.start))
            .collect();
        if pred(&t) {
            out.push(t);
        }
        for (raw, start) in nested {
            walk(&raw, start, pred, out);
        }
    }
}

pub fn comments(text: &str) -> Vec<Comment> {
    COMMENT_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Comment {
                text: caps[1].trim().to_string(),
                span: whole.range(),
            })
        })
        .collect()
}

/// All `== text ==` lines of `text`, skipping those inside comments.
pub fn headings(text: &str) -> Vec<Heading> {
    let hidden: Vec<Range<usize>> = comments(text).into_iter().map(|c| c.span).collect();
    let mut out = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if hidden.iter().any(|r| r.contains(&start)) {
            continue;
        }
        if let Some((level, heading)) = parse_heading(line) {
            out.push(Heading {
                level,
                text: heading,
                span: start..offset,
            });
        }
    }

    out
}

/// Parse a single heading line. Level is the smaller of the leading and
/// trailing `=` runs (capped at 6); surplus `=` stays in the text.
pub fn parse_heading(line: &str) -> Option<(usize, String)> {
    if !line.starts_with('=') {
        return None;
    }
    let stripped = strip_comments(line);
    // a comment opened here closes on a later line
    let cleaned = match stripped.find("<!--") {
        Some(i) => &stripped[..i],
        None => stripped.as_str(),
    };
    let cleaned = cleaned.trim_end();
    let lead = cleaned.bytes().take_while(|&b| b == b'=').count();
    let trail = cleaned.bytes().rev().take_while(|&b| b == b'=').count();
    if lead == cleaned.len() {
        return None;
    }
    let level = lead.min(trail).min(6);
    if level == 0 {
        return None;
    }
    let text = cleaned[level..cleaned.len() - level].trim();
    if text.is_empty() {
        return None;
    }
    Some((level, text.to_string()))
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 4..]
        .windows(3)
        .position(|w| w == b"-->")
        .map(|p| start + 4 + p + 3)
        .unwrap_or(bytes.len())
}

/// Parse the template opening at `start` (which must point at `{{`).
/// `None` when it is never closed.
fn parse_template_at(text: &str, start: usize) -> Option<Template> {
    let bytes = text.as_bytes();
    let mut i = start + 2;
    let mut curly = 0usize;
    let mut square = 0usize;
    let mut pipes = Vec::new();

    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(b"<!--") {
            i = skip_comment(bytes, i);
        } else if rest.starts_with(b"{{") {
            curly += 1;
            i += 2;
        } else if rest.starts_with(b"}}") {
            if curly == 0 {
                return Some(build_template(text, start, &pipes, i));
            }
            curly -= 1;
            i += 2;
        } else if rest.starts_with(b"[[") {
            square += 1;
            i += 2;
        } else if rest.starts_with(b"]]") && square > 0 {
            square -= 1;
            i += 2;
        } else {
            if bytes[i] == b'|' && curly == 0 && square == 0 {
                pipes.push(i);
            }
            i += 1;
        }
    }

    None
}

fn build_template(text: &str, start: usize, pipes: &[usize], close: usize) -> Template {
    let name_end = pipes.first().copied().unwrap_or(close);
    let name = normalize_name(&strip_comments(&text[start + 2..name_end]));

    let mut params = Vec::with_capacity(pipes.len());
    let mut next_positional = 1;
    for (k, &pipe) in pipes.iter().enumerate() {
        let seg_start = pipe + 1;
        let seg_end = pipes.get(k + 1).copied().unwrap_or(close);
        let param = match top_level_eq(text.as_bytes(), seg_start, seg_end) {
            Some(eq) => Param {
                key: ParamKey::Named(strip_comments(&text[seg_start..eq]).trim().to_string()),
                raw: text[eq + 1..seg_end].to_string(),
                span: seg_start..seg_end,
                value_span: eq + 1..seg_end,
            },
            None => {
                let key = ParamKey::Positional(next_positional);
                next_positional += 1;
                Param {
                    key,
                    raw: text[seg_start..seg_end].to_string(),
                    span: seg_start..seg_end,
                    value_span: seg_start..seg_end,
                }
            }
        };
        params.push(param);
    }

    Template {
        name,
        params,
        span: start..close + 2,
    }
}

fn top_level_eq(bytes: &[u8], start: usize, end: usize) -> Option<usize> {
    let mut i = start;
    let mut depth = 0usize;
    while i < end {
        let rest = &bytes[i..end];
        if rest.starts_with(b"<!--") {
            i = skip_comment(bytes, i).min(end);
        } else if rest.starts_with(b"{{") || rest.starts_with(b"[[") {
            depth += 1;
            i += 2;
        } else if rest.starts_with(b"}}") || rest.starts_with(b"]]") {
            depth = depth.saturating_sub(1);
            i += 2;
        } else {
            if bytes[i] == b'=' && depth == 0 {
                return Some(i);
            }
            i += 1;
        }
    }
    None
}
