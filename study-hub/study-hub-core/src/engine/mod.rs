//! The per-study dispatcher: gate, scope, mutate, propagate.
//!
//! `StudySync` exclusively owns one study's state. Every member action flows
//! through [`StudySync::apply`]: the permission gate runs first, the chapter
//! mode decides whether a tree write is shared or private, the mutation lands,
//! and the presence tracker computes who receives what. Errors never escape:
//! they turn into `denied` (and, for stale targets, `reloadRequired`) events
//! addressed to the requester alone.

use crate::chapter::{ChapterData, ChapterMode, ChapterStore, Orientation};
use crate::error::ActionError;
use crate::mode::{self, WriteScope};
use crate::permission::{self, Capability};
use crate::presence::PresenceTracker;
use crate::protocol::{
    Action, AnalysisSnapshot, Outbound, ReloadData, ServerEvent, StudySnapshot, Who,
};
use crate::study::{Member, MemberRole, Study, Visibility};
use crate::tree::{InMemoryTree, MoveTree, NodeId, Path, Position, TreeFactory};
use std::collections::HashMap;
use uuid::Uuid;

#[cfg(test)]
mod tests;

pub struct StudySync {
    study: Study,
    chapters: ChapterStore,
    presence: PresenceTracker,
    trees: HashMap<Uuid, Box<dyn MoveTree>>,
    tree_factory: TreeFactory,
}

impl StudySync {
    pub fn new(
        name: impl Into<String>,
        owner: Member,
        visibility: Visibility,
        first_chapter: ChapterData,
    ) -> Self {
        Self::with_tree_factory(name, owner, visibility, first_chapter, InMemoryTree::boxed)
    }

    pub fn with_tree_factory(
        name: impl Into<String>,
        owner: Member,
        visibility: Visibility,
        first_chapter: ChapterData,
        tree_factory: TreeFactory,
    ) -> Self {
        let owner_id = owner.user_id.clone();
        let mut chapters = ChapterStore::new();
        let chapter_id = chapters.create(first_chapter, &owner_id).id;
        let mut trees: HashMap<Uuid, Box<dyn MoveTree>> = HashMap::new();
        trees.insert(chapter_id, tree_factory());
        let study = Study::new(name, owner, visibility, Position::chapter_root(chapter_id));
        StudySync {
            study,
            chapters,
            presence: PresenceTracker::new(),
            trees,
            tree_factory,
        }
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    pub fn chapters(&self) -> &ChapterStore {
        &self.chapters
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Register a connection. Private studies admit members only; public and
    /// unlisted studies admit anyone as a spectator. The cursor starts at the
    /// active chapter's root.
    pub fn connect(&mut self, socket_id: Uuid, user_id: &str) -> Result<ReloadData, ActionError> {
        let role = self.gate_visibility(user_id)?;
        let chapter_id = self
            .chapters
            .active_id()
            .expect("a study always holds at least one chapter");
        self.presence.connect(
            user_id,
            socket_id,
            Position::chapter_root(chapter_id),
            self.study.settings.sticky,
            permission::can_write(role),
        );
        Ok(self.reload_data(user_id))
    }

    /// Remove the cursor, but only if it still belongs to this socket; a
    /// reconnect may already have replaced it.
    pub fn disconnect(&mut self, socket_id: Uuid, user_id: &str) {
        if self.presence.get(user_id).map(|c| c.socket_id) == Some(socket_id) {
            self.presence.disconnect(user_id);
        }
    }

    /// The complete point-in-time projection for one member, conceal-filtered.
    /// Also served outside a connection, for the resync fallback.
    pub fn snapshot_for(&self, user_id: &str) -> Result<ReloadData, ActionError> {
        self.gate_visibility(user_id)?;
        Ok(self.reload_data(user_id))
    }

    fn gate_visibility(&self, user_id: &str) -> Result<Option<MemberRole>, ActionError> {
        let role = self.study.role_of(user_id);
        if self.study.visibility == Visibility::Private && role.is_none() {
            return Err(ActionError::PermissionDenied(
                "this study is private".into(),
            ));
        }
        Ok(role)
    }

    fn reload_data(&self, user_id: &str) -> ReloadData {
        let role = self.study.role_of(user_id);
        let chapter = self
            .chapters
            .active()
            .expect("a study always holds at least one chapter");
        let privileged = mode::privileged(chapter, user_id, role);
        let position = mode::position_view(chapter, privileged, &self.study.position);
        let paths = self
            .trees
            .get(&chapter.id)
            .map(|t| t.paths())
            .unwrap_or_default();
        ReloadData {
            analysis: AnalysisSnapshot {
                chapter: chapter.clone(),
                position: position.clone(),
                paths: mode::visible_paths(chapter, privileged, paths),
            },
            study: StudySnapshot {
                id: self.study.id,
                name: self.study.name.clone(),
                owner_id: self.study.owner_id.clone(),
                members: self.study.member_list(),
                settings: self.study.settings.clone(),
                visibility: self.study.visibility,
                description: self.study.description.clone(),
                chapters: self.chapters.previews(),
                active_chapter_id: self.chapters.active_id(),
                position,
                created_at: self.study.created_at,
                updated_at: self.study.updated_at,
            },
        }
    }

    /// Apply one member action and produce the outbound event stream.
    /// Actions from the same member arrive in submission order; the caller
    /// serializes actions across members (one mutation at a time per study).
    pub fn apply(&mut self, user_id: &str, action: Action) -> Vec<Outbound> {
        let Some(cursor) = self.presence.get(user_id) else {
            tracing::warn!(user = user_id, "dropping action from a member with no cursor");
            return Vec::new();
        };
        let who = Who {
            socket_id: cursor.socket_id,
            user_id: user_id.to_string(),
        };
        let result = match action.validate() {
            Ok(()) => self.dispatch(&who, action),
            Err(err) => Err(err),
        };
        match result {
            Ok(events) => events,
            Err(err) => {
                tracing::debug!(user = user_id, error = %err, "action rejected");
                let mut events = vec![Outbound {
                    socket_id: who.socket_id,
                    event: ServerEvent::Denied {
                        reason: err.to_string(),
                    },
                }];
                if err.needs_resync() {
                    events.push(Outbound {
                        socket_id: who.socket_id,
                        event: ServerEvent::ReloadRequired {
                            analysis: true,
                            study: false,
                        },
                    });
                }
                events
            }
        }
    }

    fn dispatch(&mut self, who: &Who, action: Action) -> Result<Vec<Outbound>, ActionError> {
        match action {
            Action::SetPosition { chapter_id, path } => {
                self.set_position(who, chapter_id, &path)
            }
            Action::Move {
                path,
                orig,
                dest,
                promotion,
            } => {
                let node = NodeId::from_parts(&[
                    orig.as_str(),
                    dest.as_str(),
                    promotion.as_deref().unwrap_or(""),
                ]);
                self.play_node(who, &path, node)
            }
            Action::Drop { path, role, pos } => {
                let node = NodeId::from_parts(&[role.as_str(), "@", pos.as_str()]);
                self.play_node(who, &path, node)
            }
            Action::SetChapter { chapter_id } => self.set_chapter(who, chapter_id),
            Action::AddChapter { data } => self.add_chapter(who, data),
            Action::EditChapter {
                id,
                name,
                orientation,
                mode,
                description,
            } => self.edit_chapter(who, id, name, orientation, mode, description),
            Action::DeleteChapter { chapter_id } => self.delete_chapter(who, chapter_id),
            Action::ReorderChapters { ids } => self.reorder_chapters(who, ids),
            Action::SetSetting { key, value } => self.set_setting(who, key, value),
            Action::SetSticky { sticky } => self.set_sticky(who, sticky),
            Action::Invite {
                user_id,
                display_name,
            } => self.invite(who, user_id, display_name),
            Action::Kick { user_id } => self.kick(who, &user_id),
            Action::SetRole { user_id, role } => self.set_member_role(who, &user_id, role),
            Action::ChatSay { text } => self.chat_say(who, text),
            Action::RequestAnalysis { chapter_id } => self.request_analysis(who, chapter_id),
            Action::SetStudyDescription { text } => self.set_description(who, text),
        }
    }

    fn role(&self, user_id: &str) -> Option<MemberRole> {
        self.study.role_of(user_id)
    }

    fn require_write(&self, user_id: &str) -> Result<(), ActionError> {
        if permission::can_write(self.role(user_id)) {
            Ok(())
        } else {
            Err(ActionError::PermissionDenied(
                "contributor role required".into(),
            ))
        }
    }

    fn require_owner(&self, user_id: &str) -> Result<(), ActionError> {
        if permission::can_configure(self.role(user_id)) {
            Ok(())
        } else {
            Err(ActionError::PermissionDenied(
                "only the study owner may do this".into(),
            ))
        }
    }

    fn to_everyone(&self, event: ServerEvent) -> Vec<Outbound> {
        self.presence
            .iter()
            .map(|(_, cursor)| Outbound {
                socket_id: cursor.socket_id,
                event: event.clone(),
            })
            .collect()
    }

    fn to_requester(&self, who: &Who, event: ServerEvent) -> Vec<Outbound> {
        vec![Outbound {
            socket_id: who.socket_id,
            event,
        }]
    }

    /// A move or drop: the mode decides where the node lands.
    fn play_node(&mut self, who: &Who, raw_path: &str, node: NodeId) -> Result<Vec<Outbound>, ActionError> {
        let parent = Path::parse(raw_path)
            .ok_or_else(|| ActionError::MalformedAction("bad path".into()))?;
        let user = who.user_id.as_str();
        let cursor = self
            .presence
            .get(user)
            .ok_or_else(|| ActionError::InvalidTarget("no cursor".into()))?;
        let chapter_id = cursor.position.chapter_id;
        let mover_sticky = cursor.sticky;
        let chapter = self
            .chapters
            .get(chapter_id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("chapter {chapter_id} is gone")))?;

        match mode::write_scope(chapter, user) {
            WriteScope::Shared => {
                self.require_write(user)?;
                let tree = self
                    .trees
                    .get_mut(&chapter_id)
                    .ok_or_else(|| ActionError::InvalidTarget("chapter tree is gone".into()))?;
                let new_path = tree.add_node(&parent, node).ok_or_else(|| {
                    ActionError::InvalidTarget(format!("path {parent} no longer exists"))
                })?;
                let new_pos = Position {
                    chapter_id,
                    path: new_path,
                };
                let old_shared = self.study.position.clone();
                self.presence.local_move(user, new_pos.clone());
                let snapped = if mover_sticky {
                    self.study.position = new_pos.clone();
                    self.presence.snap_sticky(user, &new_pos)
                } else {
                    Vec::new()
                };
                self.study.touch();

                let chapter = self.chapters.get(chapter_id).expect("checked above");
                let mut events = Vec::new();
                for (uid, cur) in self.presence.iter() {
                    let privileged = mode::privileged(chapter, uid, self.study.role_of(uid));
                    let view = mode::position_view(chapter, privileged, &new_pos);
                    if view.concealed {
                        // beyond this member's horizon: only notify when the
                        // visible prefix actually moved
                        let old_view = mode::position_view(chapter, privileged, &old_shared);
                        if view.path == old_view.path && old_shared.chapter_id == chapter_id {
                            continue;
                        }
                    }
                    events.push(Outbound {
                        socket_id: cur.socket_id,
                        event: ServerEvent::NodeAdded {
                            who: who.clone(),
                            position: view.clone(),
                        },
                    });
                    if uid != user && snapped.contains(uid) {
                        events.push(Outbound {
                            socket_id: cur.socket_id,
                            event: ServerEvent::PositionUpdated {
                                who: who.clone(),
                                position: view,
                            },
                        });
                    }
                }
                Ok(events)
            }
            WriteScope::Scratch => {
                // private divergence: nothing shared mutates, nobody else hears
                let scratch = Position {
                    chapter_id,
                    path: parent.child(node),
                };
                self.presence.local_move(user, scratch.clone());
                Ok(self.to_requester(
                    who,
                    ServerEvent::NodeAdded {
                        who: who.clone(),
                        position: mode::PositionView {
                            chapter_id,
                            path: scratch.path,
                            concealed: false,
                        },
                    },
                ))
            }
            WriteScope::AdvanceOnly => {
                let child = parent.child(node);
                let tree = self
                    .trees
                    .get(&chapter_id)
                    .ok_or_else(|| ActionError::InvalidTarget("chapter tree is gone".into()))?;
                if !tree.contains(&child) {
                    return Err(ActionError::ModeViolation(
                        "gamebook viewers advance along the scripted line only".into(),
                    ));
                }
                let pos = Position {
                    chapter_id,
                    path: child,
                };
                self.presence.local_move(user, pos.clone());
                Ok(self.to_requester(
                    who,
                    ServerEvent::PositionUpdated {
                        who: who.clone(),
                        position: mode::PositionView {
                            chapter_id,
                            path: pos.path,
                            concealed: false,
                        },
                    },
                ))
            }
        }
    }

    fn set_position(&mut self, who: &Who, chapter_id: Uuid, raw_path: &str) -> Result<Vec<Outbound>, ActionError> {
        let path = Path::parse(raw_path)
            .ok_or_else(|| ActionError::MalformedAction("bad path".into()))?;
        let user = who.user_id.as_str();
        let role = self.role(user);
        let chapter = self
            .chapters
            .get(chapter_id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("chapter {chapter_id} is gone")))?;
        let pos = Position { chapter_id, path };

        let scope = mode::write_scope(chapter, user);
        if scope == WriteScope::Scratch {
            // practice exploration is private; no validation against the
            // shared tree, no broadcast
            self.presence.local_move(user, pos);
            return Ok(Vec::new());
        }

        let tree = self
            .trees
            .get(&chapter_id)
            .ok_or_else(|| ActionError::InvalidTarget("chapter tree is gone".into()))?;
        if !tree.contains(&pos.path) {
            return Err(ActionError::InvalidTarget(format!(
                "path {} no longer exists",
                pos.path
            )));
        }
        let privileged = mode::privileged(chapter, user, role);
        if let ChapterMode::Conceal { depth } = chapter.mode {
            if !privileged && pos.path.depth() > depth {
                return Err(ActionError::ModeViolation(
                    "that position is still concealed".into(),
                ));
            }
        }

        self.presence.local_move(user, pos.clone());
        let cursor = self.presence.get(user).expect("moved above");
        if scope == WriteScope::Shared && cursor.sticky && permission::can_write(role) {
            self.study.position = pos.clone();
            let snapped = self.presence.snap_sticky(user, &pos);
            self.study.touch();
            let chapter = self.chapters.get(chapter_id).expect("checked above");
            let mut events = Vec::new();
            for (uid, cur) in self.presence.iter() {
                if !snapped.contains(uid) {
                    continue;
                }
                let privileged = mode::privileged(chapter, uid, self.study.role_of(uid));
                events.push(Outbound {
                    socket_id: cur.socket_id,
                    event: ServerEvent::PositionUpdated {
                        who: who.clone(),
                        position: mode::position_view(chapter, privileged, &pos),
                    },
                });
            }
            Ok(events)
        } else {
            Ok(Vec::new())
        }
    }

    fn set_chapter(&mut self, who: &Who, chapter_id: Uuid) -> Result<Vec<Outbound>, ActionError> {
        let user = who.user_id.as_str();
        if self.chapters.get(chapter_id).is_none() {
            return Err(ActionError::InvalidTarget(format!(
                "chapter {chapter_id} is gone"
            )));
        }
        let root = Position::chapter_root(chapter_id);
        let cursor = self
            .presence
            .get(user)
            .ok_or_else(|| ActionError::InvalidTarget("no cursor".into()))?;
        if cursor.sticky && permission::can_write(self.role(user)) {
            self.chapters.set_active(chapter_id)?;
            self.study.position = root.clone();
            self.presence.local_move(user, root.clone());
            self.presence.snap_sticky(user, &root);
            self.study.touch();
            let chapter = self.chapters.get(chapter_id).expect("checked above");
            let mut events = Vec::new();
            for (uid, cur) in self.presence.iter() {
                let privileged = mode::privileged(chapter, uid, self.study.role_of(uid));
                events.push(Outbound {
                    socket_id: cur.socket_id,
                    event: ServerEvent::ChapterSwitched {
                        who: who.clone(),
                        position: mode::position_view(chapter, privileged, &root),
                    },
                });
            }
            Ok(events)
        } else {
            // independent exploration: only this member's cursor moves
            self.presence.local_move(user, root);
            Ok(Vec::new())
        }
    }

    fn add_chapter(&mut self, who: &Who, data: ChapterData) -> Result<Vec<Outbound>, ActionError> {
        let user = who.user_id.as_str();
        self.require_write(user)?;
        let set_active = data.set_active;
        let chapter = self.chapters.create(data, user);
        let chapter_id = chapter.id;
        let meta = chapter.preview();
        self.trees.insert(chapter_id, (self.tree_factory)());
        self.study.touch();

        let mut events = self.to_everyone(ServerEvent::ChapterAdded {
            who: who.clone(),
            meta,
        });
        if set_active {
            let root = Position::chapter_root(chapter_id);
            self.study.position = root.clone();
            self.presence.local_move(user, root.clone());
            self.presence.snap_sticky(user, &root);
            events.extend(self.to_everyone(ServerEvent::ChapterSwitched {
                who: who.clone(),
                position: mode::PositionView {
                    chapter_id,
                    path: root.path,
                    concealed: false,
                },
            }));
        }
        Ok(events)
    }

    fn edit_chapter(
        &mut self,
        who: &Who,
        id: Uuid,
        name: String,
        orientation: Orientation,
        new_mode: ChapterMode,
        description: Option<String>,
    ) -> Result<Vec<Outbound>, ActionError> {
        let user = who.user_id.as_str();
        self.require_write(user)?;
        let chapter = self
            .chapters
            .get_mut(id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("chapter {id} is gone")))?;
        if chapter.mode != new_mode {
            mode::transition(chapter, new_mode)?;
        }
        chapter.name = name;
        chapter.setup.orientation = orientation;
        chapter.description = description.filter(|d| !d.trim().is_empty());
        let meta = chapter.preview();
        self.study.touch();
        Ok(self.to_everyone(ServerEvent::ChapterEdited {
            who: who.clone(),
            meta,
        }))
    }

    fn delete_chapter(&mut self, who: &Who, chapter_id: Uuid) -> Result<Vec<Outbound>, ActionError> {
        let user = who.user_id.as_str();
        self.require_write(user)?;
        let outcome = self.chapters.delete(chapter_id)?;
        self.trees.remove(&chapter_id);
        let mut events = self.to_everyone(ServerEvent::ChapterRemoved {
            who: who.clone(),
            chapter_id,
        });

        // an empty store cannot position any cursor: restore a default chapter
        // right away, in the same mutation
        if self.chapters.is_empty() {
            let chapter = self.chapters.create(
                ChapterData {
                    name: "Chapter 1".into(),
                    variant: None,
                    from_fen: None,
                    orientation: Orientation::White,
                    mode: ChapterMode::Normal,
                    set_active: true,
                },
                &self.study.owner_id.clone(),
            );
            let meta = chapter.preview();
            self.trees.insert(chapter.id, (self.tree_factory)());
            events.extend(self.to_everyone(ServerEvent::ChapterAdded {
                who: who.clone(),
                meta,
            }));
        }

        let active = self
            .chapters
            .active_id()
            .expect("store refilled above when emptied");
        let active_changed = outcome.new_active.is_some();
        let fallback = Position::chapter_root(active);
        if self.study.position.chapter_id == chapter_id {
            self.study.position = fallback.clone();
        }
        // dangling cursors snap to the fallback and hear about it
        let mut resnapped = Vec::new();
        for (uid, cursor) in self.presence.iter_mut() {
            if cursor.position.chapter_id == chapter_id {
                cursor.position = fallback.clone();
                resnapped.push((uid.clone(), cursor.socket_id));
            }
        }
        for (_, socket_id) in &resnapped {
            events.push(Outbound {
                socket_id: *socket_id,
                event: ServerEvent::PositionUpdated {
                    who: who.clone(),
                    position: mode::PositionView {
                        chapter_id: active,
                        path: fallback.path.clone(),
                        concealed: false,
                    },
                },
            });
        }
        if active_changed {
            events.extend(self.to_everyone(ServerEvent::ChapterSwitched {
                who: who.clone(),
                position: mode::PositionView {
                    chapter_id: active,
                    path: Path::root(),
                    concealed: false,
                },
            }));
        }
        self.study.touch();
        Ok(events)
    }

    fn reorder_chapters(&mut self, who: &Who, ids: Vec<Uuid>) -> Result<Vec<Outbound>, ActionError> {
        self.require_write(who.user_id.as_str())?;
        self.chapters.reorder(&ids)?;
        self.study.touch();
        Ok(self.to_everyone(ServerEvent::ChaptersReordered {
            who: who.clone(),
            ids,
        }))
    }

    fn set_setting(
        &mut self,
        who: &Who,
        key: crate::study::SettingKey,
        value: crate::study::SettingValue,
    ) -> Result<Vec<Outbound>, ActionError> {
        self.require_owner(who.user_id.as_str())?;
        self.study.settings.set(key, value)?;
        self.study.touch();
        Ok(self.to_everyone(ServerEvent::SettingsChanged {
            who: who.clone(),
            settings: self.study.settings.clone(),
        }))
    }

    fn set_sticky(&mut self, who: &Who, sticky: bool) -> Result<Vec<Outbound>, ActionError> {
        let user = who.user_id.as_str();
        self.presence
            .set_sticky(user, sticky)
            .ok_or_else(|| ActionError::InvalidTarget("no cursor".into()))?;
        if !sticky {
            return Ok(Vec::new());
        }
        // snap-on-enable: rejoin the shared position immediately
        let shared = self.study.position.clone();
        self.presence.local_move(user, shared.clone());
        let chapter = self
            .chapters
            .get(shared.chapter_id)
            .ok_or_else(|| ActionError::InvalidTarget("active chapter is gone".into()))?;
        let privileged = mode::privileged(chapter, user, self.role(user));
        Ok(self.to_requester(
            who,
            ServerEvent::PositionUpdated {
                who: who.clone(),
                position: mode::position_view(chapter, privileged, &shared),
            },
        ))
    }

    fn invite(&mut self, who: &Who, user_id: String, display_name: String) -> Result<Vec<Outbound>, ActionError> {
        self.require_owner(who.user_id.as_str())?;
        if self.study.members.contains_key(&user_id) {
            return Err(ActionError::MalformedAction(format!(
                "{user_id} is already a member"
            )));
        }
        self.study
            .add_member(Member::new(user_id, display_name, MemberRole::Viewer));
        self.study.touch();
        Ok(self.to_everyone(ServerEvent::MembersChanged {
            who: who.clone(),
            members: self.study.member_list(),
        }))
    }

    fn kick(&mut self, who: &Who, user_id: &str) -> Result<Vec<Outbound>, ActionError> {
        self.require_owner(who.user_id.as_str())?;
        self.study.remove_member(user_id)?;
        self.study.touch();
        let kicked_socket = if let Some(cursor) = self.presence.get_mut(user_id) {
            cursor.write_allowed = false;
            Some(cursor.socket_id)
        } else {
            None
        };
        let mut events = self.to_everyone(ServerEvent::MembersChanged {
            who: who.clone(),
            members: self.study.member_list(),
        });
        if self.study.visibility == Visibility::Private {
            if let Some(socket_id) = kicked_socket {
                // the connection no longer has standing; force a resync that
                // the visibility gate will refuse
                events.push(Outbound {
                    socket_id,
                    event: ServerEvent::ReloadRequired {
                        analysis: false,
                        study: true,
                    },
                });
            }
        }
        Ok(events)
    }

    fn set_member_role(&mut self, who: &Who, user_id: &str, role: MemberRole) -> Result<Vec<Outbound>, ActionError> {
        self.require_owner(who.user_id.as_str())?;
        self.study.set_role(user_id, role)?;
        self.study.touch();
        if let Some(cursor) = self.presence.get_mut(user_id) {
            cursor.write_allowed = permission::can_write(Some(role));
        }
        Ok(self.to_everyone(ServerEvent::MembersChanged {
            who: who.clone(),
            members: self.study.member_list(),
        }))
    }

    fn chat_say(&mut self, who: &Who, text: String) -> Result<Vec<Outbound>, ActionError> {
        let role = self.role(who.user_id.as_str());
        if !permission::resolve(&self.study.settings, role, Capability::Chat) {
            return Err(ActionError::PermissionDenied(
                "chat is not open to you".into(),
            ));
        }
        Ok(self.to_everyone(ServerEvent::ChatLine {
            who: who.clone(),
            text,
        }))
    }

    fn request_analysis(&mut self, who: &Who, chapter_id: Uuid) -> Result<Vec<Outbound>, ActionError> {
        let role = self.role(who.user_id.as_str());
        let chapter = self
            .chapters
            .get(chapter_id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("chapter {chapter_id} is gone")))?;
        if !permission::resolve(&self.study.settings, role, Capability::Computer) {
            return Err(ActionError::PermissionDenied(
                "computer analysis is not open to you".into(),
            ));
        }
        if !chapter.features.computer {
            return Err(ActionError::PermissionDenied(
                "computer analysis is disabled for this chapter".into(),
            ));
        }
        Ok(self.to_requester(who, ServerEvent::AnalysisQueued { chapter_id }))
    }

    fn set_description(&mut self, who: &Who, text: String) -> Result<Vec<Outbound>, ActionError> {
        let user = who.user_id.as_str();
        self.require_write(user)?;
        if !self.study.settings.description {
            return Err(ActionError::PermissionDenied(
                "the study description is disabled".into(),
            ));
        }
        self.study.description = if text.trim().is_empty() {
            None
        } else {
            Some(text)
        };
        self.study.touch();
        Ok(self.to_everyone(ServerEvent::DescriptionChanged {
            who: who.clone(),
            description: self.study.description.clone(),
        }))
    }
}
