use crate::core::errors::{Result, SimError};
use crate::core::instance::Store;
use crate::core::types::{EventKey, InstanceId};

/// Entry of the scheduler queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Periodic step shared by every part with the same dt.
    Step(EventKey),
    /// Runs `update` and `finish` once for the listed parts.
    Once { targets: Vec<InstanceId> },
}

/// Periodic event owning a circular list of the parts due at each tick.
///
/// The list is threaded through the `prev`/`next` links of the instances, so
/// moving a part between steps is a constant-time dequeue plus enqueue.
#[derive(Debug, Clone)]
pub struct EventStep {
    pub key: EventKey,
    pub t: f64,
    pub dt: f64,
    head: Option<InstanceId>,
    len: usize,
}

impl EventStep {
    pub fn new(key: EventKey, t: f64, dt: f64) -> Self {
        Self {
            key,
            t,
            dt,
            head: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn head(&self) -> Option<InstanceId> {
        self.head
    }

    /// Appends `id` at the tail of the list.
    pub fn enqueue(&mut self, store: &mut Store, id: InstanceId) -> Result<()> {
        let instance = store.get(id)?;
        if let Some(other) = instance.event {
            return Err(SimError::invariant(format!(
                "{id} is already queued in {other}, cannot join {}",
                self.key
            )));
        }

        match self.head {
            None => {
                let instance = store.get_mut(id)?;
                instance.prev = Some(id);
                instance.next = Some(id);
                self.head = Some(id);
            }
            Some(head) => {
                let tail = store
                    .get(head)?
                    .prev
                    .ok_or_else(|| SimError::invariant(format!("{} has a broken list", self.key)))?;
                store.get_mut(tail)?.next = Some(id);
                store.get_mut(head)?.prev = Some(id);
                let instance = store.get_mut(id)?;
                instance.prev = Some(tail);
                instance.next = Some(head);
            }
        }
        store.get_mut(id)?.event = Some(self.key);
        self.len += 1;
        Ok(())
    }

    /// Unlinks `id`, which must be a member of this step.
    pub fn dequeue(&mut self, store: &mut Store, id: InstanceId) -> Result<()> {
        let instance = store.get(id)?;
        if instance.event != Some(self.key) {
            return Err(SimError::invariant(format!("{id} is not queued in {}", self.key)));
        }
        let (prev, next) = match (instance.prev, instance.next) {
            (Some(p), Some(n)) => (p, n),
            _ => return Err(SimError::invariant(format!("{id} has broken links"))),
        };

        if next == id {
            self.head = None;
        } else {
            store.get_mut(prev)?.next = Some(next);
            store.get_mut(next)?.prev = Some(prev);
            if self.head == Some(id) {
                self.head = Some(next);
            }
        }
        let instance = store.get_mut(id)?;
        instance.prev = None;
        instance.next = None;
        instance.event = None;
        self.len -= 1;
        Ok(())
    }

    /// Members in list order, head first.
    pub fn members(&self, store: &Store) -> Result<Vec<InstanceId>> {
        let mut result = Vec::with_capacity(self.len);
        let Some(head) = self.head else {
            return Ok(result);
        };
        let mut current = head;
        loop {
            result.push(current);
            current = store
                .get(current)?
                .next
                .ok_or_else(|| SimError::invariant(format!("{} has a broken list", self.key)))?;
            if current == head {
                break;
            }
            if result.len() > self.len {
                return Err(SimError::invariant(format!("{} list does not close", self.key)));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::{Instance, Role};
    use crate::core::model::PartBuilder;

    fn store_with(n: usize) -> (Store, Vec<InstanceId>) {
        let set = PartBuilder::new("x").build().unwrap();
        let mut store = Store::new();
        let ids = (0..n)
            .map(|_| store.insert(Instance::new(set.clone(), Role::Part, None)))
            .collect();
        (store, ids)
    }

    #[test]
    fn test_enqueue_preserves_order() {
        let (mut store, ids) = store_with(3);
        let mut step = EventStep::new(EventKey(0), 0.0, 0.1);
        for id in &ids {
            step.enqueue(&mut store, *id).unwrap();
        }
        assert_eq!(step.members(&store).unwrap(), ids);
        assert_eq!(step.len(), 3);
    }

    #[test]
    fn test_dequeue_head_middle_and_last() {
        let (mut store, ids) = store_with(4);
        let mut step = EventStep::new(EventKey(0), 0.0, 0.1);
        for id in &ids {
            step.enqueue(&mut store, *id).unwrap();
        }
        step.dequeue(&mut store, ids[0]).unwrap();
        step.dequeue(&mut store, ids[2]).unwrap();
        assert_eq!(step.members(&store).unwrap(), vec![ids[1], ids[3]]);
        step.dequeue(&mut store, ids[1]).unwrap();
        step.dequeue(&mut store, ids[3]).unwrap();
        assert!(step.is_empty());
        assert!(step.members(&store).unwrap().is_empty());
    }

    #[test]
    fn test_double_enqueue_is_rejected() {
        let (mut store, ids) = store_with(1);
        let mut a = EventStep::new(EventKey(0), 0.0, 0.1);
        let mut b = EventStep::new(EventKey(1), 0.0, 0.2);
        a.enqueue(&mut store, ids[0]).unwrap();
        assert!(matches!(a.enqueue(&mut store, ids[0]), Err(SimError::SchedulerInvariant(_))));
        assert!(matches!(b.enqueue(&mut store, ids[0]), Err(SimError::SchedulerInvariant(_))));
        assert!(matches!(b.dequeue(&mut store, ids[0]), Err(SimError::SchedulerInvariant(_))));
    }
}
