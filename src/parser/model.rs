use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Team {
    pub name: String,
    pub players: Vec<String>,
    pub coach: Option<String>,
    pub qualifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Opponent {
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Match {
    pub opponent1: Opponent,
    pub opponent2: Opponent,
    pub winner: Option<String>,
}

/// A stage either holds matches directly or nests further named groups
/// (sub-groups, rounds).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum StageNode {
    Matches(Vec<Match>),
    Groups(StageMap),
}

impl StageNode {
    pub fn match_count(&self) -> usize {
        self.matches().len()
    }

    /// Every match under this node, in document order.
    pub fn matches(&self) -> Vec<&Match> {
        match self {
            StageNode::Matches(m) => m.iter().collect(),
            StageNode::Groups(g) => g.iter().flat_map(|(_, n)| n.matches()).collect(),
        }
    }
}

/// Insertion-ordered name → node mapping. Inserting an existing name
/// replaces its node in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageMap {
    entries: Vec<(String, StageNode)>,
}

impl StageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, node: StageNode) {
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = node,
            None => self.entries.push((name, node)),
        }
    }

    /// Merge `other` in, entry by entry, with the same replace semantics.
    pub fn extend(&mut self, other: StageMap) {
        for (name, node) in other.entries {
            self.insert(name, node);
        }
    }

    pub fn get(&self, name: &str) -> Option<&StageNode> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, n)| n)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageNode)> {
        self.entries.iter().map(|(k, n)| (k.as_str(), n))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn match_count(&self) -> usize {
        self.entries.iter().map(|(_, n)| n.match_count()).sum()
    }

    /// Drop every node (recursively) that ends up holding no matches.
    pub fn prune_empty(&mut self) {
        for (_, node) in &mut self.entries {
            if let StageNode::Groups(g) = node {
                g.prune_empty();
            }
        }
        self.entries.retain(|(_, n)| n.match_count() > 0);
    }
}

impl Serialize for StageMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TournamentData {
    pub participants: Vec<Team>,
    pub results: StageMap,
}

/// Lower-case, trim, and join internal whitespace runs with `_`.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}
