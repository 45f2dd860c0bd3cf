use serde::{Deserialize, Serialize};

/// Logical commands from the input layer (buttons, keys, stdin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    StartSegment,
    StopSegment,
    StartNoiseCalibration,
    StopNoiseCalibration,
    DeleteLastSegment,
    Combine,
    Quit,
}

impl Command {
    /// Map a key to a command:
    /// `r` record, `s` stop, `n` room noise, `x` stop room noise,
    /// `d` delete last, `c` combine, `q` quit.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'r' => Some(Self::StartSegment),
            's' => Some(Self::StopSegment),
            'n' => Some(Self::StartNoiseCalibration),
            'x' => Some(Self::StopNoiseCalibration),
            'd' => Some(Self::DeleteLastSegment),
            'c' => Some(Self::Combine),
            'q' => Some(Self::Quit),
            _ => None,
        }
    }

    /// Commands that must wait until no take is running
    pub fn requires_idle(&self) -> bool {
        matches!(
            self,
            Self::StartSegment
                | Self::StartNoiseCalibration
                | Self::DeleteLastSegment
                | Self::Combine
        )
    }
}
