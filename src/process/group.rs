/*!
 * Group Table
 *
 * pgid -> {sid, members}. Sessions are not stored separately; a session is
 * the set of groups sharing a `sid`. A group never outlives its last member.
 */

use super::types::{GroupSnapshot, ProcessGroup};
use crate::core::errors::InvariantViolation;
use crate::core::types::{Pgid, Pid, Sid};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Default)]
pub struct GroupTable {
    groups: BTreeMap<Pgid, ProcessGroup>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Found a group led by `leader`; the leader is its first member
    pub fn create(&mut self, leader: Pid, sid: Sid) -> Result<(), InvariantViolation> {
        if self.groups.contains_key(&leader) {
            return Err(InvariantViolation::GroupExists(leader));
        }
        self.groups.insert(
            leader,
            ProcessGroup {
                sid,
                members: BTreeSet::from([leader]),
            },
        );
        debug!(pgid = leader, sid, "Created process group");
        Ok(())
    }

    pub fn add_member(&mut self, pgid: Pgid, pid: Pid) -> Result<(), InvariantViolation> {
        let group = self
            .groups
            .get_mut(&pgid)
            .ok_or(InvariantViolation::GroupMissing(pgid))?;
        group.members.insert(pid);
        Ok(())
    }

    /// Drop `pid` from `pgid`, deleting the group once empty
    ///
    /// Returns whether the group was deleted.
    pub fn remove_member(&mut self, pid: Pid, pgid: Pgid) -> Result<bool, InvariantViolation> {
        let group = self
            .groups
            .get_mut(&pgid)
            .ok_or(InvariantViolation::MembershipMissing { pid, pgid })?;
        if !group.members.remove(&pid) {
            return Err(InvariantViolation::MembershipMissing { pid, pgid });
        }
        if group.members.is_empty() {
            self.groups.remove(&pgid);
            debug!(pgid, "Deleted empty process group");
            return Ok(true);
        }
        Ok(false)
    }

    pub fn get(&self, pgid: Pgid) -> Option<&ProcessGroup> {
        self.groups.get(&pgid)
    }

    #[inline]
    pub fn contains(&self, pgid: Pgid) -> bool {
        self.groups.contains_key(&pgid)
    }

    /// Session owning a group
    pub fn sid_of(&self, pgid: Pgid) -> Result<Sid, InvariantViolation> {
        self.groups
            .get(&pgid)
            .map(|group| group.sid)
            .ok_or(InvariantViolation::GroupMissing(pgid))
    }

    pub fn snapshot(&self) -> Vec<GroupSnapshot> {
        self.groups
            .iter()
            .map(|(pgid, group)| GroupSnapshot {
                pgid: *pgid,
                sid: group.sid,
                members: group.members.iter().copied().collect(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
