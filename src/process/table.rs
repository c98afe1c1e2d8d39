/*!
 * Process Table
 * pid -> record, including exited records waiting to be reaped
 */

use super::types::{ProcessRecord, ProcessSnapshot};
use crate::core::types::{Pgid, Pid};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct ProcessTable {
    records: BTreeMap<Pid, ProcessRecord>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ProcessRecord) {
        self.records.insert(record.pid, record);
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut ProcessRecord> {
        self.records.get_mut(&pid)
    }

    /// Tracked and still running
    pub fn live(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.records.get(&pid).filter(|record| !record.has_exited())
    }

    pub fn remove(&mut self, pid: Pid) -> Option<ProcessRecord> {
        self.records.remove(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.records.contains_key(&pid)
    }

    /// First exited child of `ppid`, optionally restricted to one group
    pub fn find_exited_child(&self, ppid: Pid, pgid: Option<Pgid>) -> Option<Pid> {
        self.records
            .values()
            .find(|record| {
                record.has_exited()
                    && record.ppid == ppid
                    && pgid.map_or(true, |pgid| record.pgid == pgid)
            })
            .map(|record| record.pid)
    }

    /// Move every child of `from` under `to`; returns how many moved
    pub fn reparent_children(&mut self, from: Pid, to: Pid) -> usize {
        let mut moved = 0;
        for record in self.records.values_mut().filter(|record| record.ppid == from) {
            record.ppid = to;
            moved += 1;
        }
        moved
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    pub fn snapshot(&self) -> Vec<ProcessSnapshot> {
        self.records.values().map(ProcessRecord::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
