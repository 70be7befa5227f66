//! Capability resolution over the `UserSelection` order.
//!
//! Pure functions of the study settings and the requester's role. They are
//! re-evaluated on every action so a setting change restricts or expands the
//! very next action, with no grace window.

use crate::study::{MemberRole, Settings, UserSelection};
use serde::{Deserialize, Serialize};

/// The capabilities governed by a `UserSelection` selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Computer,
    Explorer,
    Cloneable,
    Shareable,
    Chat,
}

fn requester_rank(role: Option<MemberRole>) -> u8 {
    match role {
        None => 0,
        Some(MemberRole::Viewer) => 1,
        Some(MemberRole::Contributor) => 2,
        Some(MemberRole::Owner) => 3,
    }
}

fn required_rank(selection: UserSelection) -> u8 {
    match selection {
        UserSelection::Everyone => 0,
        UserSelection::Member => 1,
        UserSelection::Contributor => 2,
        UserSelection::Owner => 3,
        UserSelection::Nobody => 4,
    }
}

/// Allow iff the requester's rank meets the configured selector.
/// The owner is always permitted, `Nobody` notwithstanding.
pub fn resolve(settings: &Settings, role: Option<MemberRole>, capability: Capability) -> bool {
    if role == Some(MemberRole::Owner) {
        return true;
    }
    let selection = match capability {
        Capability::Computer => settings.computer,
        Capability::Explorer => settings.explorer,
        Capability::Cloneable => settings.cloneable,
        Capability::Shareable => settings.shareable,
        Capability::Chat => settings.chat,
    };
    requester_rank(role) >= required_rank(selection)
}

/// Shared-tree and chapter mutations need contributor or better.
pub fn can_write(role: Option<MemberRole>) -> bool {
    matches!(role, Some(MemberRole::Contributor) | Some(MemberRole::Owner))
}

/// Settings and membership are the owner's alone.
pub fn can_configure(role: Option<MemberRole>) -> bool {
    role == Some(MemberRole::Owner)
}
