/// Log tags identify the subsystem that emitted a message.
///
/// Each tag maps to a `--debug-<key>` command-line flag that enables debug
/// output for that subsystem only.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Health,
    Transport,
    Events,
}

impl LogTag {
    /// All tags, in display order
    pub const ALL: [LogTag; 5] = [
        LogTag::System,
        LogTag::Config,
        LogTag::Health,
        LogTag::Transport,
        LogTag::Events,
    ];

    /// Key used in `--debug-<key>` flags and tag filters
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Health => "health",
            LogTag::Transport => "transport",
            LogTag::Events => "events",
        }
        .to_string()
    }

    /// Uppercase label used in console and plain output
    pub fn to_plain_string(&self) -> String {
        self.to_debug_key().to_uppercase()
    }

    /// Parse a tag from its debug key
    pub fn from_debug_key(key: &str) -> Option<Self> {
        LogTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.to_debug_key() == key.to_lowercase())
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
