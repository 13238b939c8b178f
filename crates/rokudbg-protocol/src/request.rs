//! Outgoing command requests.
//!
//! ```text
//! u32 declared_size | u32 request_id | u32 command_code | params...
//! ```
//!
//! `declared_size` comes from a fixed per-command table rather than the
//! encoded length.

/// Commands the client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Stop,
    Continue,
    Threads,
    Stacktrace,
}

impl CommandKind {
    pub fn code(self) -> u32 {
        match self {
            Self::Stop => 1,
            Self::Continue => 2,
            Self::Threads => 3,
            Self::Stacktrace => 4,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Stop),
            2 => Some(Self::Continue),
            3 => Some(Self::Threads),
            4 => Some(Self::Stacktrace),
            _ => None,
        }
    }

    /// Value written into the `declared_size` field.
    pub fn declared_size(self) -> u32 {
        match self {
            Self::Stop | Self::Continue | Self::Threads => 12,
            Self::Stacktrace => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Continue => "continue",
            Self::Threads => "threads",
            Self::Stacktrace => "stacktrace",
        }
    }
}

/// A command with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Stop,
    Continue,
    Threads,
    Stacktrace { thread_index: u32 },
}

impl Request {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Stop => CommandKind::Stop,
            Self::Continue => CommandKind::Continue,
            Self::Threads => CommandKind::Threads,
            Self::Stacktrace { .. } => CommandKind::Stacktrace,
        }
    }
}

/// A request paired with the id it goes out under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub request_id: u32,
    pub request: Request,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for kind in [
            CommandKind::Stop,
            CommandKind::Continue,
            CommandKind::Threads,
            CommandKind::Stacktrace,
        ] {
            assert_eq!(CommandKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(CommandKind::from_code(0), None);
    }

    #[test]
    fn test_declared_sizes() {
        assert_eq!(CommandKind::Stop.declared_size(), 12);
        assert_eq!(CommandKind::Stacktrace.declared_size(), 16);
    }
}
