//! Symbol interning.
//!
//! Every string appearing in a datalog program (predicate names, string
//! values, variable names) is replaced by a small integer index so that
//! serialization and signature input stay deterministic and compact. A fixed
//! prefix of well-known symbols is shared by every table and never
//! serialized; user symbols start at [`DEFAULT_SYMBOLS_OFFSET`].

use crate::error::Evaluation;
use serde::{Deserialize, Serialize};

/// Index of an interned symbol.
pub type SymbolIndex = u64;

/// Symbols reserved by every table, occupying indexes `0..1024`.
///
/// The list is append-only: changing the order or removing an entry would
/// silently re-map the programs of every previously issued token.
pub const DEFAULT_SYMBOLS: [&str; 28] = [
    "read",
    "write",
    "resource",
    "operation",
    "right",
    "time",
    "role",
    "owner",
    "tenant",
    "namespace",
    "user",
    "team",
    "service",
    "admin",
    "email",
    "group",
    "member",
    "ip_address",
    "client",
    "client_ip",
    "domain",
    "path",
    "version",
    "cluster",
    "node",
    "hostname",
    "nonce",
    "query",
];

/// First index available to user symbols; `0..OFFSET` is reserved for the
/// default table.
pub const DEFAULT_SYMBOLS_OFFSET: SymbolIndex = 1024;

/// A symbol was declared twice in the same table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("symbol table already contains \"{0}\"")]
pub struct DuplicateSymbol(pub String);

/// Two-tier interning table: the constant default prefix plus the symbols
/// introduced by the token (or by one isolated third-party block).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<String>,
}

impl SymbolTable {
    /// Create a table containing only the default symbols.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruct a table from an already-validated symbol list.
    pub fn from_symbols(symbols: Vec<String>) -> Self {
        Self { symbols }
    }

    /// Intern a symbol, returning its index. Idempotent.
    pub fn insert(&mut self, symbol: &str) -> SymbolIndex {
        if let Some(index) = self.get(symbol) {
            return index;
        }
        self.symbols.push(symbol.to_string());
        DEFAULT_SYMBOLS_OFFSET + (self.symbols.len() as u64 - 1)
    }

    /// Look up the index of a symbol without interning it.
    pub fn get(&self, symbol: &str) -> Option<SymbolIndex> {
        if let Some(position) = DEFAULT_SYMBOLS.iter().position(|s| *s == symbol) {
            return Some(position as u64);
        }
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|position| DEFAULT_SYMBOLS_OFFSET + position as u64)
    }

    /// Resolve an index back to its string.
    pub fn get_symbol(&self, index: SymbolIndex) -> Option<&str> {
        if index < DEFAULT_SYMBOLS_OFFSET {
            DEFAULT_SYMBOLS.get(index as usize).copied()
        } else {
            self.symbols
                .get((index - DEFAULT_SYMBOLS_OFFSET) as usize)
                .map(String::as_str)
        }
    }

    /// Resolve an index, failing with [`Evaluation::UnknownSymbol`].
    pub fn print_symbol(&self, index: SymbolIndex) -> Result<&str, Evaluation> {
        self.get_symbol(index)
            .ok_or(Evaluation::UnknownSymbol(index))
    }

    /// Index that the next inserted symbol would receive.
    pub fn current_offset(&self) -> SymbolIndex {
        DEFAULT_SYMBOLS_OFFSET + self.symbols.len() as u64
    }

    /// Number of user symbols in the table.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when no user symbols have been interned.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The user symbols, in interning order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Append the symbols a deserialized block introduces.
    ///
    /// A block must not redeclare a symbol that is already present, either in
    /// the default prefix or interned by an earlier block.
    pub fn extend(&mut self, symbols: &[String]) -> Result<(), DuplicateSymbol> {
        for symbol in symbols {
            if self.get(symbol).is_some() {
                return Err(DuplicateSymbol(symbol.clone()));
            }
            self.symbols.push(symbol.clone());
        }
        Ok(())
    }
}

/// Overlay table for strings minted during expression evaluation.
///
/// Concatenation and `type()` can produce strings that are not part of the
/// signed payload; those are interned here, past the end of the frozen base
/// table, and dropped when evaluation completes.
#[derive(Debug)]
pub struct TemporarySymbolTable<'a> {
    base: &'a SymbolTable,
    offset: SymbolIndex,
    symbols: Vec<String>,
}

impl<'a> TemporarySymbolTable<'a> {
    /// Open an overlay on top of a frozen table.
    pub fn new(base: &'a SymbolTable) -> Self {
        let offset = base.current_offset();
        Self {
            base,
            offset,
            symbols: Vec::new(),
        }
    }

    /// Resolve an index from the base table or the overlay.
    pub fn get_symbol(&self, index: SymbolIndex) -> Option<&str> {
        if index >= self.offset {
            self.symbols
                .get((index - self.offset) as usize)
                .map(String::as_str)
        } else {
            self.base.get_symbol(index)
        }
    }

    /// Intern a string into the overlay, reusing base indexes when possible.
    pub fn insert(&mut self, symbol: &str) -> SymbolIndex {
        if let Some(index) = self.base.get(symbol) {
            return index;
        }
        if let Some(position) = self.symbols.iter().position(|s| s == symbol) {
            return self.offset + position as u64;
        }
        self.symbols.push(symbol.to_string());
        self.offset + self.symbols.len() as u64 - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_symbols_resolve_without_interning() {
        let table = SymbolTable::new();
        assert_eq!(table.get("read"), Some(0));
        assert_eq!(table.get("query"), Some(27));
        assert_eq!(table.get_symbol(5), Some("time"));
        assert!(table.is_empty());
    }

    #[test]
    fn user_symbols_start_past_the_reserved_prefix() {
        let mut table = SymbolTable::new();
        let a = table.insert("file1");
        let b = table.insert("file2");
        let again = table.insert("file1");
        assert_eq!(a, DEFAULT_SYMBOLS_OFFSET);
        assert_eq!(b, DEFAULT_SYMBOLS_OFFSET + 1);
        assert_eq!(a, again);
        assert_eq!(table.get_symbol(a), Some("file1"));
    }

    #[test]
    fn extend_rejects_redeclaration() {
        let mut table = SymbolTable::new();
        table.insert("file1");
        let err = table
            .extend(&["file1".to_string()])
            .expect_err("duplicate must be rejected");
        assert_eq!(err, DuplicateSymbol("file1".to_string()));

        let err = table
            .extend(&["read".to_string()])
            .expect_err("default symbols cannot be redeclared");
        assert_eq!(err, DuplicateSymbol("read".to_string()));
    }

    #[test]
    fn unknown_index_is_an_error() {
        let table = SymbolTable::new();
        assert_eq!(
            table.print_symbol(2048),
            Err(Evaluation::UnknownSymbol(2048))
        );
    }

    #[test]
    fn temporary_table_overlays_without_touching_the_base() {
        let mut base = SymbolTable::new();
        base.insert("file1");
        let mut temp = TemporarySymbolTable::new(&base);

        let existing = temp.insert("file1");
        assert_eq!(existing, DEFAULT_SYMBOLS_OFFSET);

        let minted = temp.insert("file1file2");
        assert_eq!(minted, DEFAULT_SYMBOLS_OFFSET + 1);
        assert_eq!(temp.get_symbol(minted), Some("file1file2"));
        assert_eq!(base.len(), 1);
    }
}
