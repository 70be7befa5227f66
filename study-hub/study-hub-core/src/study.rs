//! The study aggregate: members, roles, settings, shared position.

use crate::error::ActionError;
use crate::tree::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
}

/// Closed role set with a total order; spectators of a public study hold no
/// role at all (`None` at the call sites).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Viewer,
    Contributor,
    Owner,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub role: MemberRole,
}

impl Member {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: MemberRole) -> Self {
        Member {
            user_id: user_id.into(),
            display_name: display_name.into(),
            title: None,
            role,
        }
    }
}

/// Who a capability is open to. Ordered from most to least restrictive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserSelection {
    Nobody,
    Owner,
    Contributor,
    Member,
    Everyone,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub computer: UserSelection,
    pub explorer: UserSelection,
    pub cloneable: UserSelection,
    pub shareable: UserSelection,
    pub chat: UserSelection,
    pub sticky: bool,
    pub description: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            computer: UserSelection::Everyone,
            explorer: UserSelection::Everyone,
            cloneable: UserSelection::Everyone,
            shareable: UserSelection::Everyone,
            chat: UserSelection::Member,
            sticky: true,
            description: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    Computer,
    Explorer,
    Cloneable,
    Shareable,
    Chat,
    Sticky,
    Description,
}

/// Either a `UserSelection` or a boolean toggle, depending on the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Selection(UserSelection),
    Toggle(bool),
}

impl Settings {
    /// Apply one key/value pair. Type mismatches are structural errors.
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<(), ActionError> {
        use SettingKey::*;
        match (key, value) {
            (Computer, SettingValue::Selection(s)) => self.computer = s,
            (Explorer, SettingValue::Selection(s)) => self.explorer = s,
            (Cloneable, SettingValue::Selection(s)) => self.cloneable = s,
            (Shareable, SettingValue::Selection(s)) => self.shareable = s,
            (Chat, SettingValue::Selection(s)) => self.chat = s,
            (Sticky, SettingValue::Toggle(b)) => self.sticky = b,
            (Description, SettingValue::Toggle(b)) => self.description = b,
            _ => {
                return Err(ActionError::MalformedAction(format!(
                    "value type does not fit setting {key:?}"
                )))
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Study {
    pub id: Uuid,
    pub name: String,
    pub owner_id: String,
    pub members: HashMap<String, Member>,
    pub settings: Settings,
    pub visibility: Visibility,
    /// The shared "official" position sticky cursors follow.
    pub position: Position,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Study {
    pub fn new(name: impl Into<String>, owner: Member, visibility: Visibility, position: Position) -> Self {
        let now = Utc::now();
        let owner_id = owner.user_id.clone();
        let mut members = HashMap::new();
        members.insert(owner_id.clone(), Member { role: MemberRole::Owner, ..owner });
        Study {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id,
            members,
            settings: Settings::default(),
            visibility,
            position,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `None` for spectators who are not in the member map.
    pub fn role_of(&self, user_id: &str) -> Option<MemberRole> {
        self.members.get(user_id).map(|m| m.role)
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn add_member(&mut self, member: Member) {
        self.members.insert(member.user_id.clone(), member);
    }

    /// Remove a member. The owner can never be removed.
    pub fn remove_member(&mut self, user_id: &str) -> Result<Member, ActionError> {
        if self.is_owner(user_id) {
            return Err(ActionError::PermissionDenied(
                "the study owner cannot be removed".into(),
            ));
        }
        self.members
            .remove(user_id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("no member {user_id}")))
    }

    /// Change a member's role. `Owner` is not assignable: the single-owner
    /// invariant keeps `owner_id` the only owner key in the map.
    pub fn set_role(&mut self, user_id: &str, role: MemberRole) -> Result<(), ActionError> {
        if role == MemberRole::Owner {
            return Err(ActionError::MalformedAction(
                "ownership is not transferable through setRole".into(),
            ));
        }
        if self.is_owner(user_id) {
            return Err(ActionError::PermissionDenied(
                "the study owner cannot be demoted".into(),
            ));
        }
        let member = self
            .members
            .get_mut(user_id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("no member {user_id}")))?;
        member.role = role;
        Ok(())
    }

    /// Members in a stable order for event payloads.
    pub fn member_list(&self) -> Vec<Member> {
        let mut list: Vec<Member> = self.members.values().cloned().collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
