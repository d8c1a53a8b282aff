use super::instance::Instance;
use crate::core::errors::{Result, SimError};
use crate::core::types::InstanceId;

#[derive(Debug, Default)]
struct Entry {
    generation: u32,
    occupied: bool,
    instance: Option<Instance>,
}

/// Generational arena owning every instance of a run.
///
/// Handles stay valid until `remove`; afterwards the slot is recycled under
/// a new generation and stale handles fail to resolve.
#[derive(Debug, Default)]
pub struct Store {
    entries: Vec<Entry>,
    free: Vec<u32>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: Instance) -> InstanceId {
        match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.entries[slot as usize];
                entry.occupied = true;
                entry.instance = Some(instance);
                InstanceId::new(slot, entry.generation)
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    occupied: true,
                    instance: Some(instance),
                });
                InstanceId::new(self.entries.len() as u32 - 1, 0)
            }
        }
    }

    fn entry(&self, id: InstanceId) -> Result<&Entry> {
        match self.entries.get(id.slot as usize) {
            Some(e) if e.occupied && e.generation == id.generation => Ok(e),
            _ => Err(SimError::invariant(format!("stale instance handle {id}"))),
        }
    }

    fn entry_mut(&mut self, id: InstanceId) -> Result<&mut Entry> {
        match self.entries.get_mut(id.slot as usize) {
            Some(e) if e.occupied && e.generation == id.generation => Ok(e),
            _ => Err(SimError::invariant(format!("stale instance handle {id}"))),
        }
    }

    pub fn get(&self, id: InstanceId) -> Result<&Instance> {
        self.entry(id)?
            .instance
            .as_ref()
            .ok_or_else(|| SimError::invariant(format!("instance {id} is checked out")))
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Result<&mut Instance> {
        self.entry_mut(id)?
            .instance
            .as_mut()
            .ok_or_else(|| SimError::invariant(format!("instance {id} is checked out")))
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.entry(id).is_ok()
    }

    /// True when `id` names a stored instance that has not died.
    pub fn is_live(&self, id: InstanceId) -> bool {
        self.get(id).map(|i| i.live).unwrap_or(false)
    }

    /// Checks an instance out for evaluation. It must be returned with `put`.
    pub(crate) fn take(&mut self, id: InstanceId) -> Result<Instance> {
        self.entry_mut(id)?
            .instance
            .take()
            .ok_or_else(|| SimError::invariant(format!("instance {id} is already checked out")))
    }

    pub(crate) fn put(&mut self, id: InstanceId, instance: Instance) -> Result<()> {
        let entry = self.entry_mut(id)?;
        if entry.instance.is_some() {
            return Err(SimError::invariant(format!("instance {id} was not checked out")));
        }
        entry.instance = Some(instance);
        Ok(())
    }

    /// Frees the slot of `id`.
    pub(crate) fn remove(&mut self, id: InstanceId) -> Result<Instance> {
        let entry = self.entry_mut(id)?;
        let instance = entry
            .instance
            .take()
            .ok_or_else(|| SimError::invariant(format!("instance {id} is checked out")))?;
        entry.occupied = false;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.slot);
        Ok(instance)
    }

    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &Instance)> {
        self.entries.iter().enumerate().filter_map(|(slot, e)| {
            e.instance
                .as_ref()
                .filter(|_| e.occupied)
                .map(|i| (InstanceId::new(slot as u32, e.generation), i))
        })
    }
}
