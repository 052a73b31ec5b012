use thiserror::Error;
use uuid::Uuid;

/// Task queue misuse. `Empty` is what workers see once every entry has been
/// claimed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("task queue {0} has no unpopped entries")]
    Empty(Uuid),

    #[error("file {file} already has an unpopped entry in task queue {queue}")]
    DuplicateFile { queue: Uuid, file: Uuid },

    #[error("task queue {queue} has no popped entry {entry}")]
    UnknownEntry { queue: Uuid, entry: Uuid },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown file state code: {0}")]
    UnknownStateCode(String),

    #[error("unknown process step: {0}")]
    UnknownStep(String),

    #[error("unknown pipeline role: {0}")]
    UnknownRole(String),

    #[error("no pipeline processor handles files in state {0}")]
    NoProcessorForState(String),
}
