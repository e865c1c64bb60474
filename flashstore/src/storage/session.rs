/// Open-file state. At most one file is open at a time, either for reading
/// or for writing; `close` is the only way back to `Mode::None`.
use crate::flash::SECTOR_SIZE;

/// Session mode visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    None,
    Read,
    Write,
}

/// Cursor state of the open file. `file` is the 1-based table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Session {
    Idle,
    Read {
        file: usize,
        cursor: u32,
    },
    /// `frontier` is the exclusive end of the erased region ahead of the
    /// cursor. Always sector aligned and never below `cursor`.
    Write {
        file: usize,
        cursor: u32,
        frontier: u32,
    },
}

impl Session {
    /// Write session at the start of a new file whose first sector has just
    /// been erased.
    pub fn write_at(file: usize, start: u32) -> Self {
        Session::Write {
            file,
            cursor: start,
            frontier: start + SECTOR_SIZE,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Session::Idle => Mode::None,
            Session::Read { .. } => Mode::Read,
            Session::Write { .. } => Mode::Write,
        }
    }
}

/// Whether the cursor has come close enough to the erase frontier that the
/// next sector should be erased now.
pub(crate) fn lookahead_due(cursor: u32, frontier: u32, lookahead: u32) -> bool {
    cursor > frontier.saturating_sub(lookahead)
}
