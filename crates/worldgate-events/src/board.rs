//! Message board kind derivation.
//!
//! Boards placed in the world carry their block position in the id
//! (`board@12,64,-3`). Every other id names a global board.

use worldgate_types::BoardKind;

/// Prefix shared by all positioned board ids.
const LOCAL_BOARD_PREFIX: &str = "board@";

/// Kind and optional position derived from a board id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardLocation {
    /// `Local` when the id encodes a position.
    pub kind: BoardKind,
    /// Parsed `(x, y, z)` for local boards, `None` for global ones.
    pub coords: Option<[i64; 3]>,
}

impl BoardLocation {
    /// Derive the location from a board id.
    ///
    /// The id is local only when it is exactly `board@` followed by three
    /// comma-separated integers with no surrounding whitespace.
    pub fn from_board_id(board_id: &str) -> Self {
        parse_local_coords(board_id).map_or(
            Self {
                kind: BoardKind::Global,
                coords: None,
            },
            |coords| Self {
                kind: BoardKind::Local,
                coords: Some(coords),
            },
        )
    }
}

fn parse_local_coords(board_id: &str) -> Option<[i64; 3]> {
    let rest = board_id.strip_prefix(LOCAL_BOARD_PREFIX)?;
    let mut parts = rest.split(',');
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some([x, y, z])
}
