//! Connected-member cursors and the sticky broadcast rule.

use crate::tree::Position;
use std::collections::HashMap;
use uuid::Uuid;

/// One connected member's view state. Created on connect, destroyed on
/// disconnect, mutated only by the engine and this tracker.
#[derive(Clone, Debug)]
pub struct Cursor {
    pub socket_id: Uuid,
    pub position: Position,
    pub sticky: bool,
    pub write_allowed: bool,
}

/// Cursor map keyed by member id; each connected member has exactly one.
#[derive(Default)]
pub struct PresenceTracker {
    cursors: HashMap<String, Cursor>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cursor at the given position. A reconnect replaces the
    /// previous cursor wholesale.
    pub fn connect(
        &mut self,
        user_id: &str,
        socket_id: Uuid,
        position: Position,
        sticky: bool,
        write_allowed: bool,
    ) -> &Cursor {
        self.cursors.insert(
            user_id.to_string(),
            Cursor {
                socket_id,
                position,
                sticky,
                write_allowed,
            },
        );
        &self.cursors[user_id]
    }

    /// Drop the cursor; no further events reach this member.
    pub fn disconnect(&mut self, user_id: &str) -> Option<Cursor> {
        self.cursors.remove(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<&Cursor> {
        self.cursors.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut Cursor> {
        self.cursors.get_mut(user_id)
    }

    pub fn set_sticky(&mut self, user_id: &str, sticky: bool) -> Option<&mut Cursor> {
        let cursor = self.cursors.get_mut(user_id)?;
        cursor.sticky = sticky;
        Some(cursor)
    }

    pub fn local_move(&mut self, user_id: &str, position: Position) {
        if let Some(cursor) = self.cursors.get_mut(user_id) {
            cursor.position = position;
        }
    }

    /// Snap every *other* sticky cursor to the shared position. Returns the
    /// affected member ids, which are the broadcast targets of the sticky rule.
    pub fn snap_sticky(&mut self, mover: &str, position: &Position) -> Vec<String> {
        let mut snapped = Vec::new();
        for (user, cursor) in self.cursors.iter_mut() {
            if user != mover && cursor.sticky {
                cursor.position = position.clone();
                snapped.push(user.clone());
            }
        }
        snapped.sort();
        snapped
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cursor)> {
        self.cursors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Cursor)> {
        self.cursors.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
