use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::Result;
use crate::parser::markup::normalize_name;

const ORDINAL_ROUNDS: [&str; 9] = [
    "first_round",
    "second_round",
    "third_round",
    "fourth_round",
    "fifth_round",
    "sixth_round",
    "seventh_round",
    "eighth_round",
    "ninth_round",
];

const ELIMINATION_ROUNDS: [&str; 3] = ["quarterfinals", "semifinals", "grand_final"];

/// What to do with a match where neither opponent name could be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    #[default]
    Drop,
    Placeholder,
}

/// Built-in round label table used by the structural bracket fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPreset {
    /// `first_round` .. `ninth_round`
    #[default]
    Ordinal,
    /// `quarterfinals`, `semifinals`, `grand_final`
    Elimination,
    /// `round_<n>` throughout
    Generic,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub unresolved_opponents: UnresolvedPolicy,
    pub placeholder_name: String,
    pub keep_empty_stages: bool,
    pub round_preset: RoundPreset,
    /// Per-round overrides, keyed by round number ("1", "2", ...).
    pub round_names: BTreeMap<String, String>,
    pub bracket_prefixes: Vec<String>,
    pub roster_templates: Vec<String>,
    pub opponent_templates: Vec<String>,
    pub stage_templates: Vec<String>,
    pub win_markers: Vec<String>,
    pub forfeit_markers: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            unresolved_opponents: UnresolvedPolicy::Drop,
            placeholder_name: "TBD".to_string(),
            keep_empty_stages: true,
            round_preset: RoundPreset::Ordinal,
            round_names: BTreeMap::new(),
            bracket_prefixes: strings(&["bracket", "matchlist"]),
            roster_templates: strings(&["teamcard"]),
            opponent_templates: strings(&["teamopponent", "soloopponent", "opponent", "literalopponent"]),
            stage_templates: strings(&["stage", "hiddensort"]),
            win_markers: strings(&["w"]),
            forfeit_markers: strings(&["ff", "dq", "l"]),
        }
    }
}

impl ExtractOptions {
    /// Load options from a TOML file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let opts = Self::from_toml(&raw)?;
        info!("Loaded extraction options from {}", path.display());
        Ok(opts)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Label for bracket round `n` when the page gives none.
    pub fn round_label(&self, n: u32) -> String {
        if let Some(name) = self.round_names.get(&n.to_string()) {
            return name.clone();
        }
        let table: &[&str] = match self.round_preset {
            RoundPreset::Ordinal => &ORDINAL_ROUNDS,
            RoundPreset::Elimination => &ELIMINATION_ROUNDS,
            RoundPreset::Generic => &[],
        };
        (n as usize)
            .checked_sub(1)
            .and_then(|i| table.get(i))
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("round_{}", n))
    }

    pub fn is_bracket(&self, template_name: &str) -> bool {
        self.bracket_prefixes
            .iter()
            .any(|p| template_name.starts_with(&normalize_name(p)))
    }

    pub fn is_roster(&self, template_name: &str) -> bool {
        contains_name(&self.roster_templates, template_name)
    }

    pub fn is_opponent(&self, template_name: &str) -> bool {
        contains_name(&self.opponent_templates, template_name)
    }

    pub fn is_stage_marker(&self, template_name: &str) -> bool {
        contains_name(&self.stage_templates, template_name)
    }

    pub fn is_win_marker(&self, score: &str) -> bool {
        self.win_markers.iter().any(|m| m.eq_ignore_ascii_case(score))
    }

    pub fn is_forfeit_marker(&self, score: &str) -> bool {
        self.forfeit_markers.iter().any(|m| m.eq_ignore_ascii_case(score))
    }
}

fn contains_name(list: &[String], template_name: &str) -> bool {
    list.iter().any(|n| normalize_name(n) == template_name)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_labels() {
        let opts = ExtractOptions::default();
        assert_eq!(opts.round_label(1), "first_round");
        assert_eq!(opts.round_label(9), "ninth_round");
        assert_eq!(opts.round_label(10), "round_10");
        assert_eq!(opts.round_label(0), "round_0");
    }

    #[test]
    fn elimination_preset_with_override() {
        let opts = ExtractOptions::from_toml(
            r#"
            round_preset = "elimination"
            [round_names]
            3 = "final"
            "#,
        )
        .unwrap();
        assert_eq!(opts.round_label(1), "quarterfinals");
        assert_eq!(opts.round_label(3), "final");
        assert_eq!(opts.round_label(4), "round_4");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let opts = ExtractOptions::from_toml(
            r#"
            unresolved_opponents = "placeholder"
            keep_empty_stages = false
            "#,
        )
        .unwrap();
        assert_eq!(opts.unresolved_opponents, UnresolvedPolicy::Placeholder);
        assert!(!opts.keep_empty_stages);
        assert_eq!(opts.placeholder_name, "TBD");
        assert!(opts.is_bracket("bracket/8"));
    }

    #[test]
    fn generic_preset() {
        let opts = ExtractOptions::from_toml(r#"round_preset = "generic""#).unwrap();
        assert_eq!(opts.round_label(2), "round_2");
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(ExtractOptions::from_toml("keep_empty_stages = \"maybe\"").is_err());
    }

    #[test]
    fn template_name_matching() {
        let opts = ExtractOptions::default();
        assert!(opts.is_bracket("bracket"));
        assert!(opts.is_bracket("matchlist"));
        assert!(!opts.is_bracket("match"));
        assert!(opts.is_roster("teamcard"));
        assert!(opts.is_opponent("teamopponent"));
        assert!(opts.is_win_marker("W"));
        assert!(opts.is_forfeit_marker("FF"));
    }
}
