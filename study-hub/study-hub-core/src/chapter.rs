//! Chapters: ordered position/tree units within a study.
//!
//! The store owns the sequence and the active-chapter selection; tree content
//! lives behind the `MoveTree` seam and is keyed by chapter id in the engine.

use crate::error::ActionError;
use crate::tree::Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    White,
    Black,
    Auto,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSetup {
    pub variant: String,
    pub orientation: Orientation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_fen: Option<String>,
}

/// Behavioral mode of a chapter. A single tagged variant: the modes are
/// mutually exclusive by construction, not by convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChapterMode {
    Normal,
    Practice,
    Gamebook,
    Conceal { depth: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterFeatures {
    pub computer: bool,
    pub explorer: bool,
}

impl Default for ChapterFeatures {
    fn default() -> Self {
        ChapterFeatures {
            computer: true,
            explorer: true,
        }
    }
}

/// Broadcast-relay marker for chapters fed by an external game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relay {
    pub path: Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_move_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: Uuid,
    pub name: String,
    pub owner_id: String,
    pub setup: ChapterSetup,
    pub tags: Vec<(String, String)>,
    pub mode: ChapterMode,
    pub features: ChapterFeatures,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<Relay>,
}

/// Read-only projection for chapter listings; never independently mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPreview {
    pub id: Uuid,
    pub name: String,
    pub orientation: Orientation,
}

impl Chapter {
    pub fn preview(&self) -> ChapterPreview {
        ChapterPreview {
            id: self.id,
            name: self.name.clone(),
            orientation: self.setup.orientation,
        }
    }
}

/// Inbound payload for creating a chapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterData {
    pub name: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub from_fen: Option<String>,
    pub orientation: Orientation,
    pub mode: ChapterMode,
    /// Becomes the active chapter only when the requester asks for it.
    #[serde(default)]
    pub set_active: bool,
}

/// Outcome of deleting a chapter.
pub struct Deleted {
    pub chapter: Chapter,
    /// The active chapter changed; `None` means the store is now empty.
    pub new_active: Option<Option<Uuid>>,
}

/// Ordered chapter sequence with exactly one active chapter while non-empty.
#[derive(Default)]
pub struct ChapterStore {
    chapters: Vec<Chapter>,
    active: Option<Uuid>,
}

impl ChapterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn create(&mut self, data: ChapterData, owner_id: &str) -> &Chapter {
        let chapter = Chapter {
            id: Uuid::new_v4(),
            name: data.name,
            owner_id: owner_id.to_string(),
            setup: ChapterSetup {
                variant: data.variant.unwrap_or_else(|| "standard".into()),
                orientation: data.orientation,
                from_fen: data.from_fen,
            },
            tags: Vec::new(),
            mode: data.mode,
            features: ChapterFeatures::default(),
            description: None,
            relay: None,
        };
        let id = chapter.id;
        self.chapters.push(chapter);
        if data.set_active || self.active.is_none() {
            self.active = Some(id);
        }
        self.chapters.last().expect("just pushed")
    }

    pub fn get(&self, id: Uuid) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == id)
    }

    pub fn active_id(&self) -> Option<Uuid> {
        self.active
    }

    pub fn active(&self) -> Option<&Chapter> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn set_active(&mut self, id: Uuid) -> Result<(), ActionError> {
        if self.get(id).is_none() {
            return Err(ActionError::InvalidTarget(format!("no chapter {id}")));
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn rename(&mut self, id: Uuid, name: String) -> Result<(), ActionError> {
        let chapter = self
            .get_mut(id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("no chapter {id}")))?;
        chapter.name = name;
        Ok(())
    }

    /// Delete a chapter. Deleting the active one atomically falls back to the
    /// preceding chapter in sequence order, then the first remaining one, and
    /// an empty store has no active chapter at all.
    pub fn delete(&mut self, id: Uuid) -> Result<Deleted, ActionError> {
        let idx = self
            .chapters
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("no chapter {id}")))?;
        let chapter = self.chapters.remove(idx);
        let new_active = if self.active == Some(id) {
            self.active = if self.chapters.is_empty() {
                None
            } else if idx > 0 {
                Some(self.chapters[idx - 1].id)
            } else {
                Some(self.chapters[0].id)
            };
            Some(self.active)
        } else {
            None
        };
        Ok(Deleted { chapter, new_active })
    }

    /// Reorder to the given permutation of the current ids.
    pub fn reorder(&mut self, ids: &[Uuid]) -> Result<(), ActionError> {
        let current: HashSet<Uuid> = self.chapters.iter().map(|c| c.id).collect();
        let requested: HashSet<Uuid> = ids.iter().copied().collect();
        if ids.len() != self.chapters.len() || current != requested {
            return Err(ActionError::InvalidTarget(
                "reorder ids are not a permutation of the current chapters".into(),
            ));
        }
        self.chapters
            .sort_by_key(|c| ids.iter().position(|id| *id == c.id).expect("checked above"));
        Ok(())
    }

    pub fn order(&self) -> Vec<Uuid> {
        self.chapters.iter().map(|c| c.id).collect()
    }

    pub fn previews(&self) -> Vec<ChapterPreview> {
        self.chapters.iter().map(Chapter::preview).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(name: &str, set_active: bool) -> ChapterData {
        ChapterData {
            name: name.into(),
            variant: None,
            from_fen: None,
            orientation: Orientation::White,
            mode: ChapterMode::Normal,
            set_active,
        }
    }

    fn store_with(names: &[&str]) -> (ChapterStore, Vec<Uuid>) {
        let mut store = ChapterStore::new();
        let ids = names
            .iter()
            .map(|n| store.create(data(n, false), "ada").id)
            .collect();
        (store, ids)
    }

    #[test]
    fn first_chapter_becomes_active_implicitly() {
        let (store, ids) = store_with(&["one", "two"]);
        assert_eq!(store.active_id(), Some(ids[0]));
    }

    #[test]
    fn create_respects_set_active() {
        let (mut store, ids) = store_with(&["one"]);
        let second = store.create(data("two", true), "ada").id;
        assert_eq!(store.active_id(), Some(second));
        assert_ne!(store.active_id(), Some(ids[0]));
    }

    #[test]
    fn deleting_active_falls_back_to_predecessor() {
        let (mut store, ids) = store_with(&["one", "two", "three"]);
        store.set_active(ids[2]).unwrap();
        let deleted = store.delete(ids[2]).unwrap();
        assert_eq!(deleted.new_active, Some(Some(ids[1])));
        assert_eq!(store.active_id(), Some(ids[1]));
    }

    #[test]
    fn deleting_first_active_falls_back_to_new_first() {
        let (mut store, ids) = store_with(&["one", "two"]);
        let deleted = store.delete(ids[0]).unwrap();
        assert_eq!(deleted.new_active, Some(Some(ids[1])));
    }

    #[test]
    fn deleting_last_chapter_empties_the_store() {
        let (mut store, ids) = store_with(&["one"]);
        let deleted = store.delete(ids[0]).unwrap();
        assert_eq!(deleted.new_active, Some(None));
        assert!(store.is_empty());
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn deleting_inactive_keeps_active() {
        let (mut store, ids) = store_with(&["one", "two"]);
        let deleted = store.delete(ids[1]).unwrap();
        assert!(deleted.new_active.is_none());
        assert_eq!(store.active_id(), Some(ids[0]));
    }

    #[test]
    fn rename_targets_must_exist() {
        let (mut store, ids) = store_with(&["one"]);
        store.rename(ids[0], "first".into()).unwrap();
        assert_eq!(store.get(ids[0]).unwrap().name, "first");
        assert!(store.rename(Uuid::new_v4(), "ghost".into()).is_err());
    }

    #[test]
    fn reorder_requires_a_permutation() {
        let (mut store, ids) = store_with(&["one", "two", "three"]);
        assert!(store.reorder(&[ids[0], ids[1]]).is_err());
        assert!(store.reorder(&[ids[0], ids[1], Uuid::new_v4()]).is_err());
        store.reorder(&[ids[2], ids[0], ids[1]]).unwrap();
        assert_eq!(store.order(), vec![ids[2], ids[0], ids[1]]);
    }
}
