//! Planner and indexer configuration.

/// Configuration shared by [`crate::QueryPlanner`] and [`crate::Indexer`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Separator splitting multi-valued single-field index values into tokens.
    pub multi_value_delimiter: char,

    /// Whether the planner also looks up composite index keys when an
    /// equality set covers every field of a composite index.
    pub composite_lookups: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multi_value_delimiter: ',',
            composite_lookups: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the multi-value delimiter.
    #[must_use]
    pub const fn multi_value_delimiter(mut self, delimiter: char) -> Self {
        self.multi_value_delimiter = delimiter;
        self
    }

    /// Sets whether composite index keys take part in planning.
    #[must_use]
    pub const fn composite_lookups(mut self, value: bool) -> Self {
        self.composite_lookups = value;
        self
    }
}
