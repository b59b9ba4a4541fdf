//! Mutable undirected friendship graph in adjacency-set form.
//!
//! The directory is the source of truth for who is connected to whom;
//! group membership is derived from it. Friendships are always written
//! symmetrically, so a one-sided edge cannot occur by construction.
//!
//! A user enters the directory the first time they appear in any event,
//! friendship or purchase, and never leaves.

use pa_common::{Error, Result, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// User-id to friend-set mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDirectory {
    users: BTreeMap<UserId, BTreeSet<UserId>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, uid: &UserId) -> bool {
        self.users.contains_key(uid)
    }

    /// Create a directory entry with no friends.
    ///
    /// Called directly when a purchase is the first encounter of a user.
    pub fn create_user(&mut self, uid: &UserId) -> Result<()> {
        if self.users.contains_key(uid) {
            return Err(Error::InvalidArgument(format!(
                "user {uid} already exists in the directory"
            )));
        }
        self.users.insert(uid.clone(), BTreeSet::new());
        Ok(())
    }

    /// The friend set of `uid`, or `None` for an unknown user.
    pub fn friends_of(&self, uid: &UserId) -> Option<&BTreeSet<UserId>> {
        self.users.get(uid)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Record a symmetric friendship, creating directory entries for
    /// ids not yet present. The newly created ids are returned so
    /// downstream components can initialize per-user state.
    ///
    /// A self-friendship is a no-op.
    pub fn add_friendship(&mut self, id1: &UserId, id2: &UserId) -> Result<Vec<UserId>> {
        if !id1.is_valid() || !id2.is_valid() {
            return Err(Error::InvalidArgument(format!(
                "add_friendship({id1:?}, {id2:?}) called with blank id"
            )));
        }

        let mut new_users = Vec::new();
        if id1 == id2 {
            return Ok(new_users);
        }

        for id in [id1, id2] {
            if !self.users.contains_key(id) {
                self.users.insert(id.clone(), BTreeSet::new());
                new_users.push(id.clone());
            }
        }

        if let Some(friends) = self.users.get_mut(id1) {
            friends.insert(id2.clone());
        }
        if let Some(friends) = self.users.get_mut(id2) {
            friends.insert(id1.clone());
        }
        Ok(new_users)
    }

    /// Remove the symmetric edge between two known, distinct users.
    pub fn remove_friendship(&mut self, id1: &UserId, id2: &UserId) -> Result<()> {
        if !id1.is_valid() || !id2.is_valid() || id1 == id2 {
            return Err(Error::InvalidArgument(format!(
                "remove_friendship({id1:?}, {id2:?}) called with bad ids"
            )));
        }
        if !self.users.contains_key(id1) || !self.users.contains_key(id2) {
            return Err(Error::InvalidArgument(format!(
                "can't remove relationship {id1}, {id2}: unknown user"
            )));
        }
        if let Some(friends) = self.users.get_mut(id1) {
            friends.remove(id2);
        }
        if let Some(friends) = self.users.get_mut(id2) {
            friends.remove(id1);
        }
        Ok(())
    }
}
