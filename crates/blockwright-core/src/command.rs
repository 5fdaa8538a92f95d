//! Typed commands and the decoder seam that produces them.

use blockwright_types::Requester;

use crate::error::DecodeError;
use crate::executor::StartRequest;

/// A request to the agent session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Compile a plan and start building it.
    Start(StartRequest),
    /// Pause the running build.
    Pause,
    /// Resume the paused build; replies go to this requester from now on.
    Resume(Requester),
    /// Cancel the active build.
    Stop,
    /// Report the active build.
    Status,
    /// List buildable plan files.
    List,
    /// Report finished builds.
    History {
        /// Most records to return.
        limit: usize,
    },
    /// Report the material gate for what remains of the build.
    Inventory,
}

impl Command {
    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Pause => "pause",
            Self::Resume(_) => "resume",
            Self::Stop => "stop",
            Self::Status => "status",
            Self::List => "list",
            Self::History { .. } => "history",
            Self::Inventory => "inventory",
        }
    }
}

/// Turns a chat line into a command.
///
/// Returns `None` when the line is not addressed to the agent at all, and
/// `Some(Err(..))` when it is but cannot be understood.
pub trait CommandDecoder {
    /// Command type produced. Front ends may wrap [`Command`] with their
    /// own variants (help text, downloads).
    type Command;

    /// Decode `line` sent by `sender`.
    fn decode(&self, line: &str, sender: &Requester)
    -> Option<Result<Self::Command, DecodeError>>;
}
