//! # Control Messages
//!
//! Out-of-band commands the host can post to a running worker.

/// A parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Promote a waiting worker immediately instead of waiting for the
    /// previous version's clients to close.
    SkipWaiting,
    /// Pre-fetch every manifest resource not yet cached.
    DownloadOffline,
}

impl WorkerMessage {
    /// Parse the wire form of a command; unknown messages are `None` and
    /// ignored by the worker.
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "skipWaiting" => Some(Self::SkipWaiting),
            "downloadOffline" => Some(Self::DownloadOffline),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_commands_parse() {
        assert_eq!(
            WorkerMessage::parse("skipWaiting"),
            Some(WorkerMessage::SkipWaiting)
        );
        assert_eq!(
            WorkerMessage::parse("downloadOffline"),
            Some(WorkerMessage::DownloadOffline)
        );
    }

    #[test]
    fn unknown_commands_are_none() {
        assert_eq!(WorkerMessage::parse("SKIPWAITING"), None);
        assert_eq!(WorkerMessage::parse(""), None);
        assert_eq!(WorkerMessage::parse("restart"), None);
    }
}
