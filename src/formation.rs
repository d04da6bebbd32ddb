use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::LineupError;
use crate::records::Position;

pub const DEFAULT_FORMATION: &str = "4-4-2";

/// Upper bound on defenders + midfielders + forwards.
pub const MAX_OUTFIELD: u32 = 10;

static CATALOG: Lazy<BTreeMap<&'static str, Formation>> = Lazy::new(|| {
    [
        ("4-4-2", [4, 4, 2]),
        ("4-3-3", [4, 3, 3]),
        ("3-5-2", [3, 5, 2]),
        ("3-4-3", [3, 4, 3]),
        ("5-3-2", [5, 3, 2]),
    ]
    .into_iter()
    .map(|(name, [d, m, f])| (name, Formation::from_outfield(name, d, m, f)))
    .collect()
});

/// Required player count per position. The goalkeeper slot is always one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formation {
    name: String,
    quotas: [u32; 4],
}

impl Formation {
    fn from_outfield(name: &str, defenders: u32, midfielders: u32, forwards: u32) -> Self {
        Self {
            name: name.to_string(),
            quotas: [1, defenders, midfielders, forwards],
        }
    }

    /// Parses `D-M-F` (e.g. "4-4-2"). Catalog entries resolve to the shared
    /// definition; any other well-formed triple with at most `MAX_OUTFIELD`
    /// outfield players is accepted as-is.
    pub fn parse(raw: &str) -> Result<Self, LineupError> {
        let trimmed = raw.trim();
        if let Some(known) = CATALOG.get(trimmed) {
            return Ok(known.clone());
        }

        let parts = trimmed
            .split('-')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                LineupError::validation(format!("formation {raw:?} must look like 4-4-2"))
            })?;
        let [d, m, f] = parts[..] else {
            return Err(LineupError::validation(format!(
                "formation {raw:?} must have exactly three outfield lines"
            )));
        };
        match d.checked_add(m).and_then(|dm| dm.checked_add(f)) {
            Some(outfield) if outfield <= MAX_OUTFIELD => {
                Ok(Self::from_outfield(&format!("{d}-{m}-{f}"), d, m, f))
            }
            _ => Err(LineupError::validation(format!(
                "formation {raw:?} fields more than {MAX_OUTFIELD} outfield players"
            ))),
        }
    }

    pub fn catalog() -> impl Iterator<Item = &'static Formation> {
        CATALOG.values()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quota(&self, position: Position) -> u32 {
        self.quotas[slot_index(position)]
    }

    pub fn total_players(&self) -> u32 {
        self.quotas.iter().sum()
    }

    pub fn quotas(&self) -> impl Iterator<Item = (Position, u32)> + '_ {
        Position::ALL.into_iter().map(|p| (p, self.quota(p)))
    }
}

impl Default for Formation {
    fn default() -> Self {
        CATALOG[DEFAULT_FORMATION].clone()
    }
}

impl FromStr for Formation {
    type Err = LineupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formation::parse(s)
    }
}

impl fmt::Display for Formation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub(crate) fn slot_index(position: Position) -> usize {
    match position {
        Position::Goalkeeper => 0,
        Position::Defender => 1,
        Position::Midfielder => 2,
        Position::Forward => 3,
    }
}
