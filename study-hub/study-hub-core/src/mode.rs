//! Chapter mode policy: transition gating, write scoping, view filtering.
//!
//! Transitions happen only through an explicit contributor action, never
//! inferred. Leaving a mode is not retroactive: history already filtered out
//! of a viewer's payloads stays filtered on their side; only payloads emitted
//! after the transition reflect the new mode.

use crate::chapter::{Chapter, ChapterMode};
use crate::error::ActionError;
use crate::study::MemberRole;
use crate::tree::Position;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conceal depths beyond this are treated as structurally invalid.
const MAX_CONCEAL_DEPTH: usize = 400;

/// How a member's tree write lands under the chapter's current mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteScope {
    /// Mutates the shared tree; subject to the write permission gate.
    Shared,
    /// Diverges into a private scratch branch invisible to other cursors.
    Scratch,
    /// Gamebook viewers: only advance along existing nodes, never branch.
    AdvanceOnly,
}

/// A position as one member is allowed to see it. Conceal truncates the path
/// and marks the payload redacted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub chapter_id: Uuid,
    pub path: crate::tree::Path,
    pub concealed: bool,
}

/// Validate and apply a mode transition on a chapter.
/// The caller has already established contributor rights.
pub fn transition(chapter: &mut Chapter, new_mode: ChapterMode) -> Result<(), ActionError> {
    if let ChapterMode::Conceal { depth } = new_mode {
        if depth > MAX_CONCEAL_DEPTH {
            return Err(ActionError::MalformedAction(format!(
                "conceal depth {depth} exceeds {MAX_CONCEAL_DEPTH}"
            )));
        }
    }
    chapter.mode = new_mode;
    Ok(())
}

/// Where a move by `user_id` (holding `role`) lands in this chapter.
pub fn write_scope(chapter: &Chapter, user_id: &str) -> WriteScope {
    let chapter_owner = chapter.owner_id == user_id;
    match chapter.mode {
        ChapterMode::Normal | ChapterMode::Conceal { .. } => WriteScope::Shared,
        ChapterMode::Practice => {
            if chapter_owner {
                WriteScope::Shared
            } else {
                WriteScope::Scratch
            }
        }
        ChapterMode::Gamebook => {
            if chapter_owner {
                WriteScope::Shared
            } else {
                WriteScope::AdvanceOnly
            }
        }
    }
}

/// Whether this member sees the chapter unfiltered.
pub fn privileged(chapter: &Chapter, user_id: &str, role: Option<MemberRole>) -> bool {
    chapter.owner_id == user_id
        || matches!(role, Some(MemberRole::Contributor) | Some(MemberRole::Owner))
}

/// A position payload filtered for one member.
pub fn position_view(chapter: &Chapter, privileged: bool, position: &Position) -> PositionView {
    if let ChapterMode::Conceal { depth } = chapter.mode {
        if !privileged && position.path.depth() > depth {
            return PositionView {
                chapter_id: position.chapter_id,
                path: position.path.truncate(depth),
                concealed: true,
            };
        }
    }
    PositionView {
        chapter_id: position.chapter_id,
        path: position.path.clone(),
        concealed: false,
    }
}

/// Tree paths filtered for one member: nodes beyond the conceal depth are
/// withheld entirely.
pub fn visible_paths(
    chapter: &Chapter,
    privileged: bool,
    paths: Vec<crate::tree::Path>,
) -> Vec<crate::tree::Path> {
    match chapter.mode {
        ChapterMode::Conceal { depth } if !privileged => {
            paths.into_iter().filter(|p| p.depth() <= depth).collect()
        }
        _ => paths,
    }
}
