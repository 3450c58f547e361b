use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How an operator asks a running service to stop.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StopProtocol {
    /// Pid and kill marker files, plus termination signals.
    #[default]
    Markers,
    /// Termination signals only; no marker files are written.
    Signals,
}

impl StopProtocol {
    /// Returns `true` when marker files take part in the protocol.
    #[must_use]
    pub const fn uses_markers(self) -> bool {
        matches!(self, Self::Markers)
    }
}
