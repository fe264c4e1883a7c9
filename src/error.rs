use std::io;

use thiserror::Error;

use crate::slot::SlotId;

/// Crate-level error surfaced at the `Poll`/`Reactor`/public-API boundary.
/// Internal syscall wrappers keep returning bare `io::Result`; this enum
/// only appears once the reactor needs to distinguish *why* an operation on
/// a slot failed from a plain OS error.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("slot table is full")]
    SlotTableFull,

    #[error("slot {0:?} is not a valid, live socket")]
    InvalidSlot(SlotId),

    #[error("command body of {len} bytes exceeds the {max} byte wire limit")]
    CommandTooLarge { len: usize, max: usize },
}
