//! ID generation utilities.

use ulid::Ulid;

/// ID generator for polls, options and ledger entries.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are:
    /// - Lexicographically sortable
    /// - Monotonically increasing within the same millisecond
    /// - Shorter than UUIDs when represented as strings
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate `count` IDs at once, e.g. for a poll's options.
    #[must_use]
    pub fn generate_many(&self, count: usize) -> Vec<String> {
        (0..count).map(|_| self.generate()).collect()
    }
}
