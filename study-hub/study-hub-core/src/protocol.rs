//! Client/server message vocabulary.
//!
//! Shapes only; the transport is an external collaborator that delivers
//! ordered messages per connection.

use crate::chapter::{Chapter, ChapterData, ChapterMode, ChapterPreview, Orientation};
use crate::error::ActionError;
use crate::mode::PositionView;
use crate::study::{Member, MemberRole, SettingKey, SettingValue, Settings, Visibility};
use crate::tree::Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_NAME_LEN: usize = 100;
const MAX_TEXT_LEN: usize = 2000;

/// Acting member's identity, attached to every mutation-originated event so
/// receivers can tell self-originated echoes from others' actions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Who {
    pub socket_id: Uuid,
    pub user_id: String,
}

/// Inbound member actions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    SetPosition {
        chapter_id: Uuid,
        path: String,
    },
    Move {
        path: String,
        orig: String,
        dest: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    Drop {
        path: String,
        role: String,
        pos: String,
    },
    SetChapter {
        chapter_id: Uuid,
    },
    AddChapter {
        data: ChapterData,
    },
    EditChapter {
        id: Uuid,
        name: String,
        orientation: Orientation,
        mode: ChapterMode,
        #[serde(default)]
        description: Option<String>,
    },
    DeleteChapter {
        chapter_id: Uuid,
    },
    ReorderChapters {
        ids: Vec<Uuid>,
    },
    SetSetting {
        key: SettingKey,
        value: SettingValue,
    },
    SetSticky {
        sticky: bool,
    },
    Invite {
        user_id: String,
        display_name: String,
    },
    Kick {
        user_id: String,
    },
    SetRole {
        user_id: String,
        role: MemberRole,
    },
    ChatSay {
        text: String,
    },
    RequestAnalysis {
        chapter_id: Uuid,
    },
    SetStudyDescription {
        text: String,
    },
}

fn square_like(s: &str) -> bool {
    !s.is_empty() && s.len() <= 4 && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'@')
}

impl Action {
    /// Structural validation, applied before any permission resolution.
    pub fn validate(&self) -> Result<(), ActionError> {
        let malformed = |msg: &str| Err(ActionError::MalformedAction(msg.into()));
        match self {
            Action::SetPosition { path, .. } | Action::Move { path, .. } | Action::Drop { path, .. }
                if Path::parse(path).is_none() =>
            {
                malformed("path is not a valid tree address")
            }
            Action::Move { orig, dest, promotion, .. } => {
                if !square_like(orig) || !square_like(dest) {
                    return malformed("orig/dest are not square-like");
                }
                if promotion.as_deref().is_some_and(|p| p.len() != 1) {
                    return malformed("promotion must be a single piece letter");
                }
                Ok(())
            }
            Action::Drop { role, pos, .. } => {
                if !square_like(role) || !square_like(pos) {
                    return malformed("drop role/pos are not square-like");
                }
                Ok(())
            }
            Action::AddChapter { data } => {
                if data.name.trim().is_empty() || data.name.len() > MAX_NAME_LEN {
                    return malformed("chapter name is empty or too long");
                }
                Ok(())
            }
            Action::EditChapter { name, .. } => {
                if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
                    return malformed("chapter name is empty or too long");
                }
                Ok(())
            }
            Action::Invite { user_id, display_name } => {
                if user_id.trim().is_empty() || display_name.trim().is_empty() {
                    return malformed("invite needs a user id and display name");
                }
                Ok(())
            }
            Action::ChatSay { text } | Action::SetStudyDescription { text } => {
                if text.len() > MAX_TEXT_LEN {
                    return malformed("text too long");
                }
                if matches!(self, Action::ChatSay { .. }) && text.trim().is_empty() {
                    return malformed("empty chat message");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Server-to-client events. One per affected member; a member with no
/// visible change receives nothing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full point-in-time projection, sent on (re)connect.
    Reload {
        data: ReloadData,
    },
    /// The shared tree gained a node.
    NodeAdded {
        who: Who,
        position: PositionView,
    },
    /// A sticky cursor was moved by an authorized mover.
    PositionUpdated {
        who: Who,
        position: PositionView,
    },
    ChapterSwitched {
        who: Who,
        position: PositionView,
    },
    ChapterAdded {
        who: Who,
        meta: ChapterPreview,
    },
    ChapterEdited {
        who: Who,
        meta: ChapterPreview,
    },
    ChapterRemoved {
        who: Who,
        chapter_id: Uuid,
    },
    ChaptersReordered {
        who: Who,
        ids: Vec<Uuid>,
    },
    SettingsChanged {
        who: Who,
        settings: Settings,
    },
    MembersChanged {
        who: Who,
        members: Vec<Member>,
    },
    DescriptionChanged {
        who: Who,
        #[serde(default)]
        description: Option<String>,
    },
    ChatLine {
        who: Who,
        text: String,
    },
    AnalysisQueued {
        chapter_id: Uuid,
    },
    /// Full-state resync fallback; the member re-requests `ReloadData`.
    ReloadRequired {
        analysis: bool,
        study: bool,
    },
    Denied {
        reason: String,
    },
}

/// An event addressed to one connection.
#[derive(Clone, Debug)]
pub struct Outbound {
    pub socket_id: Uuid,
    pub event: ServerEvent,
}

/// Analysis state of the active chapter as one member may see it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub chapter: Chapter,
    pub position: PositionView,
    /// Addressable tree paths, conceal-filtered for the receiving member.
    pub paths: Vec<Path>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySnapshot {
    pub id: Uuid,
    pub name: String,
    pub owner_id: String,
    pub members: Vec<Member>,
    pub settings: Settings,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub chapters: Vec<ChapterPreview>,
    pub active_chapter_id: Option<Uuid>,
    pub position: PositionView,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The complete projection served on (re)connect.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadData {
    pub analysis: AnalysisSnapshot,
    pub study: StudySnapshot,
}
