use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Layout of the log lines mirrored to stderr.
///
/// The in-memory log served over HTTP always uses the plain line layout;
/// this only selects how the same events appear on stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    Json,
    /// Single human-readable line per event.
    #[default]
    Compact,
}

impl LogFormat {
    /// Returns `true` for the JSON layout.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}
