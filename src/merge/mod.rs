//! Three-layer deck merge.
//!
//! A deck can reach the editor from three places at once:
//!
//! | Layer     | Source                                   | Priority |
//! |-----------|------------------------------------------|----------|
//! | `Curated` | published snapshot fetched from the server | lowest   |
//! | `Hash`    | deck encoded in a shared URL fragment    | middle   |
//! | `Local`   | the user's offline copy                  | highest  |
//!
//! `resolver::merge_layers` folds them together in ascending priority and
//! returns the merged deck plus every [`Conflict`] it had to settle. The
//! editor can then reverse individual decisions with `resolve_card` and
//! `resolve_missing`.

pub mod conflict;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use conflict::Conflict;
pub use resolver::{
    CardOrigin, MergeInput, MergeOutcome, merge_layers, resolve_card, resolve_missing,
};

/// A merge input, ordered by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Curated,
    Hash,
    Local,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Curated => "curated",
            Self::Hash => "hash",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "curated" => Ok(Self::Curated),
            "hash" => Ok(Self::Hash),
            "local" => Ok(Self::Local),
            _ => Err(format!("Invalid layer: {}", s)),
        }
    }
}
