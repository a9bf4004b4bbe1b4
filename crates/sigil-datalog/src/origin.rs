//! Fact origins and trust scoping.
//!
//! Every fact lives in a single [`Origin`]: the block that produced it, or
//! the authorizer. Rules, checks and queries carry a list of [`Scope`]
//! declarations which expand, against a concrete token, into the set of
//! origins whose facts they may read.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Where a fact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Origin {
    /// Block `i` of the token chain; the authority block is `Block(0)`
    Block(usize),
    /// The verifier-side program
    Authorizer,
}

/// A trust declaration attached to a rule, a query, or a whole block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Trust the authority block (block 0) and the authorizer
    Authority,
    /// Trust every earlier block and the authorizer
    Previous,
    /// Trust blocks whose external signature verified under this key,
    /// referenced by its interned index
    PublicKey(u64),
}

/// The set of origins a rule may read, fully expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedOrigins(BTreeSet<Origin>);

impl TrustedOrigins {
    /// Expand scope declarations for a rule executing in `current`.
    ///
    /// `rule_scopes` wins over `block_scopes`; with neither, the rule trusts
    /// the authority block. The executing origin and the authorizer are
    /// always included. `key_to_blocks` maps interned third-party key
    /// indexes to the block indexes whose external signature verified under
    /// that key.
    pub fn from_scopes(
        rule_scopes: &[Scope],
        block_scopes: &[Scope],
        current: Origin,
        key_to_blocks: &HashMap<u64, Vec<usize>>,
    ) -> Self {
        let scopes = if rule_scopes.is_empty() {
            block_scopes
        } else {
            rule_scopes
        };

        let mut origins = BTreeSet::new();
        origins.insert(current);
        origins.insert(Origin::Authorizer);
        if scopes.is_empty() {
            origins.insert(Origin::Block(0));
        }
        for scope in scopes {
            match scope {
                Scope::Authority => {
                    origins.insert(Origin::Block(0));
                }
                Scope::Previous => {
                    if let Origin::Block(current_index) = current {
                        for index in 0..current_index {
                            origins.insert(Origin::Block(index));
                        }
                    }
                }
                Scope::PublicKey(key_index) => {
                    if let Some(blocks) = key_to_blocks.get(key_index) {
                        for &index in blocks {
                            origins.insert(Origin::Block(index));
                        }
                    }
                }
            }
        }
        Self(origins)
    }

    /// True when facts from `origin` are visible.
    pub fn contains(&self, origin: &Origin) -> bool {
        self.0.contains(origin)
    }

    /// The expanded origins, in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &Origin> {
        self.0.iter()
    }
}

impl FromIterator<Origin> for TrustedOrigins {
    fn from_iter<I: IntoIterator<Item = Origin>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
