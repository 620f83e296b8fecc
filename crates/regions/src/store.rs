//! Ownership of all live regions and groups for one image.
//!
//! Every mutation of the scene goes through `add`/`replace`/`remove` (plus
//! the attribute setters), which keeps version counters honest and gives
//! auditing a single choke point: a `tracing` event and an optional
//! observer callback fire here and nowhere else.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    error::{RegionError, Result},
    types::{Group, Region},
};

/// Allocator handing out the smallest free positive region id.
///
/// Released ids sit in an ordered set below a high-water mark, so both
/// `peek` and `acquire` are O(log n) at tens of thousands of live regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u32,
    released: BTreeSet<u32>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1, released: BTreeSet::new() }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next `acquire` will return.
    pub fn peek(&self) -> u32 {
        self.released.first().copied().unwrap_or(self.next)
    }

    pub fn acquire(&mut self) -> u32 {
        if let Some(id) = self.released.pop_first() {
            id
        } else {
            let id = self.next;
            self.next += 1;
            id
        }
    }

    /// Claim `n` ids at once; bulk imports use this instead of paying the
    /// free-set lookup per inserted region.
    pub fn acquire_batch(&mut self, n: usize) -> Vec<u32> {
        let mut ids = Vec::with_capacity(n);
        while ids.len() < n {
            match self.released.pop_first() {
                Some(id) => ids.push(id),
                None => break,
            }
        }
        while ids.len() < n {
            ids.push(self.next);
            self.next += 1;
        }
        ids
    }

    /// Claim a specific id, failing with `DuplicateId` if it is live.
    pub fn reserve(&mut self, id: u32) -> Result<()> {
        if id == 0 {
            return Err(RegionError::DuplicateId(0));
        }
        if id >= self.next {
            for gap in self.next..id {
                self.released.insert(gap);
            }
            self.next = id + 1;
            Ok(())
        } else if self.released.remove(&id) {
            Ok(())
        } else {
            Err(RegionError::DuplicateId(id))
        }
    }

    pub fn release(&mut self, id: u32) {
        if id != 0 {
            self.released.insert(id);
        }
    }
}

/// Audit event emitted on every committed store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StoreEvent {
    Added { id: u32 },
    Removed { id: u32 },
    Replaced { id: u32, version: u32 },
}

/// Hook for collaborators that track edits (session logs, dirty flags).
pub trait StoreObserver {
    fn on_event(&mut self, event: &StoreEvent);
}

/// Full-value snapshot of a store's observable state.
///
/// All maps are ordered, so two equal snapshots serialize byte-for-byte
/// equal; `VersionedHistory` relies on that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    regions: BTreeMap<u32, Region>,
    stamps: BTreeMap<u32, u64>,
    sequence: u64,
    groups: BTreeMap<u32, Group>,
    next_group_id: u32,
    allocator: IdAllocator,
}

/// The set of live regions and groups for one image.
pub struct RegionStore {
    regions: BTreeMap<u32, Region>,
    /// Insertion stamps; ties in `find_containing` go to the newest.
    stamps: BTreeMap<u32, u64>,
    sequence: u64,
    groups: BTreeMap<u32, Group>,
    next_group_id: u32,
    allocator: IdAllocator,
    observer: Option<Box<dyn StoreObserver>>,
}

impl Default for RegionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionStore {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            stamps: BTreeMap::new(),
            sequence: 0,
            groups: BTreeMap::new(),
            next_group_id: 1,
            allocator: IdAllocator::new(),
            observer: None,
        }
    }

    /// Smallest positive id not currently assigned to a live region.
    pub fn get_free_id(&self) -> u32 {
        self.allocator.peek()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, id: u32) -> Result<&Region> {
        self.regions.get(&id).ok_or(RegionError::UnknownRegion(id))
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn group(&self, id: u32) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn set_observer(&mut self, observer: Box<dyn StoreObserver>) {
        self.observer = Some(observer);
    }

    /// Register a region, assigning the next free id unless `requested_id`
    /// pins one (the in-place "edit" path). Empty regions are never stored.
    pub fn add(&mut self, mut region: Region, requested_id: Option<u32>) -> Result<u32> {
        if region.area <= 0.0 {
            return Err(RegionError::Degenerate);
        }
        let id = match requested_id {
            Some(id) => {
                self.allocator.reserve(id)?;
                id
            }
            None => self.allocator.acquire(),
        };
        region.id = id;
        self.sync_group_membership(id, &mut region);
        self.sequence += 1;
        self.stamps.insert(id, self.sequence);
        self.regions.insert(id, region);
        self.emit(StoreEvent::Added { id });
        Ok(id)
    }

    /// Register many regions at once with amortized id allocation.
    ///
    /// All-or-nothing: every region is validated before the first is added.
    pub fn add_all(&mut self, regions: Vec<Region>) -> Result<Vec<u32>> {
        if regions.iter().any(|r| r.area <= 0.0) {
            return Err(RegionError::Degenerate);
        }
        let ids = self.allocator.acquire_batch(regions.len());
        for (mut region, &id) in regions.into_iter().zip(&ids) {
            region.id = id;
            self.sync_group_membership(id, &mut region);
            self.sequence += 1;
            self.stamps.insert(id, self.sequence);
            self.regions.insert(id, region);
            self.emit(StoreEvent::Added { id });
        }
        Ok(ids)
    }

    /// Swap in a new value for a live region, keeping its id and insertion
    /// stamp. The version always moves forward.
    pub fn replace(&mut self, id: u32, mut region: Region) -> Result<()> {
        let old = self.regions.get(&id).ok_or(RegionError::UnknownRegion(id))?;
        if region.area <= 0.0 {
            return Err(RegionError::Degenerate);
        }
        if region.version <= old.version {
            region.version = old.version + 1;
        }
        region.id = id;
        let version = region.version;
        self.regions.insert(id, region);
        self.emit(StoreEvent::Replaced { id, version });
        Ok(())
    }

    pub fn remove(&mut self, id: u32) -> Result<Region> {
        let region = self.regions.remove(&id).ok_or(RegionError::UnknownRegion(id))?;
        self.stamps.remove(&id);
        self.allocator.release(id);
        if let Some(group_id) = region.group_id {
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.members.remove(&id);
                if group.members.is_empty() {
                    self.groups.remove(&group_id);
                }
            }
        }
        self.emit(StoreEvent::Removed { id });
        Ok(region)
    }

    /// The region under `point`, newest insertion first on overlap.
    pub fn find_containing(&self, point: [f32; 2]) -> Option<&Region> {
        self.regions
            .values()
            .filter(|r| r.bbox.contains_point(point) && r.geometry.contains_point(point))
            .max_by_key(|r| self.stamps.get(&r.id).copied().unwrap_or(0))
    }

    pub fn set_class_name(&mut self, id: u32, class_name: impl Into<String>) -> Result<()> {
        let value = class_name.into();
        self.touch(id, |r| r.class_name = value)
    }

    pub fn set_instance_name(&mut self, id: u32, instance_name: impl Into<String>) -> Result<()> {
        let value = instance_name.into();
        self.touch(id, |r| r.instance_name = value)
    }

    pub fn set_note(&mut self, id: u32, note: impl Into<String>) -> Result<()> {
        let value = note.into();
        self.touch(id, |r| r.note = value)
    }

    pub fn set_genet(&mut self, id: u32, genet: Option<String>) -> Result<()> {
        self.touch(id, |r| r.genet = genet)
    }

    /// Gather regions into a new group. Fails if any id is unknown or
    /// already grouped.
    pub fn create_group(&mut self, ids: &[u32]) -> Result<u32> {
        if ids.is_empty() {
            return Err(RegionError::MalformedGroup(
                "a group needs at least one member".to_string(),
            ));
        }
        let members: BTreeSet<u32> = ids.iter().copied().collect();
        for &id in &members {
            let region = self.regions.get(&id).ok_or(RegionError::UnknownRegion(id))?;
            if let Some(existing) = region.group_id {
                return Err(RegionError::MalformedGroup(format!(
                    "region {id} already belongs to group {existing}"
                )));
            }
        }
        let group_id = self.next_group_id;
        self.next_group_id += 1;
        for &id in &members {
            if let Some(region) = self.regions.get_mut(&id) {
                region.group_id = Some(group_id);
            }
        }
        self.groups.insert(group_id, Group { id: group_id, members });
        tracing::debug!(group_id, "group created");
        Ok(group_id)
    }

    /// Dissolve a group without touching region geometry.
    pub fn ungroup(&mut self, group_id: u32) -> Result<()> {
        let group = self.groups.remove(&group_id).ok_or_else(|| {
            RegionError::MalformedGroup(format!("no group with id {group_id}"))
        })?;
        for id in group.members {
            if let Some(region) = self.regions.get_mut(&id) {
                region.group_id = None;
            }
        }
        tracing::debug!(group_id, "group dissolved");
        Ok(())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            regions: self.regions.clone(),
            stamps: self.stamps.clone(),
            sequence: self.sequence,
            groups: self.groups.clone(),
            next_group_id: self.next_group_id,
            allocator: self.allocator.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.regions = snapshot.regions;
        self.stamps = snapshot.stamps;
        self.sequence = snapshot.sequence;
        self.groups = snapshot.groups;
        self.next_group_id = snapshot.next_group_id;
        self.allocator = snapshot.allocator;
    }

    /// Regions derived from a grouped source arrive carrying its group id;
    /// enroll them, or drop the association if the group is gone.
    fn sync_group_membership(&mut self, id: u32, region: &mut Region) {
        if let Some(group_id) = region.group_id {
            match self.groups.get_mut(&group_id) {
                Some(group) => {
                    group.members.insert(id);
                }
                None => region.group_id = None,
            }
        }
    }

    fn touch(&mut self, id: u32, f: impl FnOnce(&mut Region)) -> Result<()> {
        let region = self.regions.get_mut(&id).ok_or(RegionError::UnknownRegion(id))?;
        f(region);
        region.version += 1;
        let version = region.version;
        self.emit(StoreEvent::Replaced { id, version });
        Ok(())
    }

    fn emit(&mut self, event: StoreEvent) {
        tracing::debug!(detail = ?event, "store mutation: {event}");
        if let Some(observer) = self.observer.as_mut() {
            observer.on_event(&event);
        }
    }
}
