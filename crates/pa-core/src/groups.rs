//! Dynamic cohort maintenance over the friendship graph.
//!
//! Group membership tracks connectivity of the friendship graph bounded
//! by the configured network depth, under both edge insertions and
//! deletions. Plain union-find cannot handle deletions, so every
//! topology change rebuilds the affected group windows by replaying the
//! members' ledger histories ("resynchronization"): O(group size) per
//! change, in exchange for exact statistics and no partially-stale
//! aggregates.
//!
//! A group is never mutated in place across a topology change. Merges
//! and splits always allocate a freshly numbered group; ids grow
//! monotonically and are never reused. Groups left empty by a merge or
//! split are reclaimed.

use chrono::NaiveDateTime;
use pa_common::{Error, GroupId, Result, UserId};
use pa_math::{RingBuffer, Sample, StatsWindow};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::directory::UserDirectory;
use crate::ledger::UserLedger;

/// Partition of users into cohorts, one shared purchase window each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRegistry {
    window_size: usize,
    network_depth: u32,
    sigma_level: u32,
    groups_counter: u64,
    buffers: BTreeMap<GroupId, RingBuffer>,
    members: BTreeMap<GroupId, BTreeSet<UserId>>,
    user_group: BTreeMap<UserId, GroupId>,
}

impl GroupRegistry {
    pub fn new(window_size: usize, network_depth: u32, sigma_level: u32) -> Self {
        Self {
            window_size,
            network_depth,
            sigma_level,
            groups_counter: 0,
            buffers: BTreeMap::new(),
            members: BTreeMap::new(),
            user_group: BTreeMap::new(),
        }
    }

    /// The group a user currently belongs to, if any.
    pub fn group_of(&self, uid: &UserId) -> Option<GroupId> {
        self.user_group.get(uid).copied()
    }

    /// Member set of a group.
    pub fn members_of(&self, group_id: GroupId) -> Result<&BTreeSet<UserId>> {
        self.members
            .get(&group_id)
            .ok_or(Error::UnknownGroup(group_id.0))
    }

    /// Number of live (non-reclaimed) groups.
    pub fn group_count(&self) -> usize {
        self.members.len()
    }

    /// The statistics window backing a group's shared purchase buffer.
    pub fn group_stats(&self, group_id: GroupId) -> Result<&StatsWindow> {
        self.buffers
            .get(&group_id)
            .map(|ring| ring.stats())
            .ok_or(Error::UnknownGroup(group_id.0))
    }

    /// New group of one, used the first time a user purchases with no
    /// prior relationships.
    pub fn create_solo_group(&mut self, uid: &UserId) -> Result<GroupId> {
        if self.user_group.contains_key(uid) {
            return Err(Error::InvalidArgument(format!(
                "user {uid} already belongs to a group"
            )));
        }
        let group_id = self.create_group();
        self.subscribe(uid, group_id);
        Ok(group_id)
    }

    /// Apply a new friendship to the partition.
    ///
    /// Joining two established groups absorbs both into a freshly
    /// numbered group; the old groups are discarded. Every structural
    /// change ends with a window resynchronization of the surviving
    /// group.
    pub fn add_friendship(&mut self, id1: &UserId, id2: &UserId, ledger: &UserLedger) -> Result<()> {
        if id1 == id2 {
            return Ok(());
        }
        match (self.group_of(id1), self.group_of(id2)) {
            (None, None) => {
                let group_id = self.create_group();
                self.subscribe(id1, group_id);
                self.subscribe(id2, group_id);
                self.resynchronize(group_id, ledger)?;
            }
            (Some(group_id), None) => {
                self.subscribe(id2, group_id);
                self.resynchronize(group_id, ledger)?;
            }
            (None, Some(group_id)) => {
                self.subscribe(id1, group_id);
                self.resynchronize(group_id, ledger)?;
            }
            (Some(g1), Some(g2)) if g1 == g2 => {
                // Already cohabiting: no structural change.
            }
            (Some(g1), Some(g2)) => {
                let merged = self.create_group();
                debug!(target: "pa_core::groups", from1 = %g1, from2 = %g2, into = %merged, "merging groups");
                for uid in self.members_of(g1)?.clone() {
                    self.move_user(&uid, merged);
                }
                for uid in self.members_of(g2)?.clone() {
                    self.move_user(&uid, merged);
                }
                self.resynchronize(merged, ledger)?;
            }
        }
        Ok(())
    }

    /// Apply an unfriend to the partition.
    ///
    /// The directory must already reflect the edge removal: the
    /// reachability query runs against it. If an alternate path still
    /// links the two users within the network depth the group stays
    /// intact; otherwise `id2` and its bounded-depth cover are carved
    /// into a freshly numbered group and both windows are rebuilt.
    pub fn remove_friendship(
        &mut self,
        id1: &UserId,
        id2: &UserId,
        directory: &UserDirectory,
        ledger: &UserLedger,
    ) -> Result<()> {
        if id1 == id2 {
            return Ok(());
        }
        let old_group = match (self.group_of(id1), self.group_of(id2)) {
            (Some(g1), Some(g2)) if g1 == g2 => g1,
            // Not cohabiting: the edge removal cannot reshape groups.
            _ => return Ok(()),
        };

        if path_exists(id1, id2, directory, self.network_depth) {
            return Ok(());
        }

        let new_group = self.create_group();
        debug!(target: "pa_core::groups", from = %old_group, into = %new_group, leaver = %id2, "splitting group");
        self.move_user(id2, new_group);
        for uid in cover(id2, directory, self.network_depth) {
            // Carve only users out of the split group; the cover is
            // depth-bounded and cannot name members of other groups.
            if self.group_of(&uid) == Some(old_group) {
                self.move_user(&uid, new_group);
            }
        }
        self.resynchronize(old_group, ledger)?;
        self.resynchronize(new_group, ledger)?;
        Ok(())
    }

    /// Rebuild a group's window by replaying every member's ledger
    /// history in timestamp order (ties broken by user id, then amount).
    ///
    /// The replay recomputes the incremental statistics exactly, from
    /// only the most recent `window_size` purchases across the group.
    pub fn resynchronize(&mut self, group_id: GroupId, ledger: &UserLedger) -> Result<()> {
        let members = self.members_of(group_id)?;
        let mut replay: Vec<Sample> = Vec::new();
        for uid in members {
            if let Some(history) = ledger.history(uid) {
                replay.extend(history);
            }
        }
        replay.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.user.cmp(&b.user))
                .then_with(|| a.amount.partial_cmp(&b.amount).unwrap_or(Ordering::Equal))
        });

        let mut fresh = RingBuffer::new(self.window_size, self.sigma_level);
        for sample in replay {
            fresh.push(sample);
        }
        self.buffers.insert(group_id, fresh);
        Ok(())
    }

    /// Record a purchase into the group's shared buffer, tagged with
    /// the purchasing user for later resynchronization use.
    pub fn record_purchase(
        &mut self,
        group_id: GroupId,
        uid: &UserId,
        amount: f64,
        timestamp: NaiveDateTime,
    ) -> Result<Option<Sample>> {
        let ring = self
            .buffers
            .get_mut(&group_id)
            .ok_or(Error::UnknownGroup(group_id.0))?;
        Ok(ring.push(Sample::new(timestamp, amount, uid.clone())))
    }

    /// Whether `amount` is anomalous against the group's current window
    /// at the configured sigma level. Call before recording the
    /// purchase: the candidate is judged against history excluding
    /// itself.
    pub fn is_anomalous(&self, group_id: GroupId, amount: f64) -> Result<bool> {
        Ok(self.group_stats(group_id)?.is_outlier(amount, None))
    }

    fn create_group(&mut self) -> GroupId {
        self.groups_counter += 1;
        let group_id = GroupId(self.groups_counter);
        self.buffers
            .insert(group_id, RingBuffer::new(self.window_size, self.sigma_level));
        self.members.insert(group_id, BTreeSet::new());
        group_id
    }

    fn subscribe(&mut self, uid: &UserId, group_id: GroupId) {
        if let Some(set) = self.members.get_mut(&group_id) {
            set.insert(uid.clone());
        }
        self.user_group.insert(uid.clone(), group_id);
    }

    /// Move a user into `new_group`, reclaiming their old group when it
    /// empties.
    fn move_user(&mut self, uid: &UserId, new_group: GroupId) {
        if let Some(old_group) = self.user_group.get(uid).copied() {
            let emptied = match self.members.get_mut(&old_group) {
                Some(set) => {
                    set.remove(uid);
                    set.is_empty()
                }
                None => false,
            };
            if emptied {
                self.members.remove(&old_group);
                self.buffers.remove(&old_group);
            }
        }
        self.subscribe(uid, new_group);
    }
}

/// Depth-bounded reachability: is `target` within `depth - 1` hops of
/// `from` in the directory?
///
/// True immediately when the two ids are equal. Implemented as an
/// explicit breadth-first frontier with a visited set, so cycles cost
/// nothing and stack depth stays flat.
pub fn path_exists(
    from: &UserId,
    target: &UserId,
    directory: &UserDirectory,
    depth: u32,
) -> bool {
    if from == target {
        return true;
    }
    let hops = depth.saturating_sub(1);
    let mut visited: BTreeSet<&UserId> = BTreeSet::new();
    let mut frontier: VecDeque<&UserId> = VecDeque::new();
    visited.insert(from);
    frontier.push_back(from);

    for _ in 0..hops {
        let mut next: VecDeque<&UserId> = VecDeque::new();
        while let Some(uid) = frontier.pop_front() {
            let Some(friends) = directory.friends_of(uid) else {
                continue;
            };
            for friend in friends {
                if friend == target {
                    return true;
                }
                if visited.insert(friend) {
                    next.push_back(friend);
                }
            }
        }
        if next.is_empty() {
            return false;
        }
        frontier = next;
    }
    false
}

/// Covering set: every user reachable from `from` within `depth - 1`
/// hops, inclusive of `from` and all intermediate nodes, deduplicated.
pub fn cover(from: &UserId, directory: &UserDirectory, depth: u32) -> BTreeSet<UserId> {
    let hops = depth.saturating_sub(1);
    let mut visited: BTreeSet<UserId> = BTreeSet::new();
    let mut frontier: VecDeque<UserId> = VecDeque::new();
    visited.insert(from.clone());
    frontier.push_back(from.clone());

    for _ in 0..hops {
        let mut next: VecDeque<UserId> = VecDeque::new();
        while let Some(uid) = frontier.pop_front() {
            let Some(friends) = directory.friends_of(&uid) else {
                continue;
            };
            for friend in friends {
                if visited.insert(friend.clone()) {
                    next.push_back(friend.clone());
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    visited
}
