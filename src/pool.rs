//! Object pool: a slab of value slots with free-list reuse and per-slot
//! reference counting. `ObjectRef` is a (pool, slot index) handle: cloning
//! it bumps the slot's ref count, dropping it decrements, and a slot
//! returns to the free list the moment its count reaches zero.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

enum Slot {
    Occupied { ref_count: usize, value: Value },
    Free { next: Option<usize> },
}

struct PoolInner {
    slots: Vec<Slot>,
    free_head: Option<usize>,
}

/// A handle to the pool, cheap to clone (it's just an `Rc`). The
/// interpreter keeps one and threads clones into builtins and scope frames
/// that need to allocate values.
#[derive(Clone)]
pub struct Pool {
    inner: Rc<RefCell<PoolInner>>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        Self { inner: Rc::new(RefCell::new(PoolInner { slots: Vec::new(), free_head: None })) }
    }

    /// Allocate a slot for `value`, reusing the free-list head if one
    /// exists. The returned handle's ref count starts at 1.
    pub fn make(&self, value: Value) -> ObjectRef {
        let mut inner = self.inner.borrow_mut();
        let index = match inner.free_head {
            Some(free) => {
                let next = match inner.slots[free] {
                    Slot::Free { next } => next,
                    Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
                };
                inner.free_head = next;
                inner.slots[free] = Slot::Occupied { ref_count: 1, value };
                free
            }
            None => {
                inner.slots.push(Slot::Occupied { ref_count: 1, value });
                inner.slots.len() - 1
            }
        };
        drop(inner);
        ObjectRef { inner: self.inner.clone(), index }
    }

    /// Total number of slots ever allocated (occupied + free), for tests.
    pub fn slot_count(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    /// Number of slots currently on the free list, for tests.
    pub fn free_count(&self) -> usize {
        let inner = self.inner.borrow();
        let mut count = 0;
        let mut cursor = inner.free_head;
        while let Some(index) = cursor {
            count += 1;
            cursor = match inner.slots[index] {
                Slot::Free { next } => next,
                Slot::Occupied { .. } => unreachable!(),
            };
        }
        count
    }
}

/// A (pool, slot index) pair. Equality is reference identity on the slot,
/// not on the value it currently holds — use `Value::eq` (via `get()`) for
/// Lox-level equality.
pub struct ObjectRef {
    inner: Rc<RefCell<PoolInner>>,
    index: usize,
}

impl ObjectRef {
    /// Clone the value stored in this slot. Cheap for every variant since
    /// compound values wrap their payload in an `Rc`.
    pub fn get(&self) -> Value {
        let inner = self.inner.borrow();
        match &inner.slots[self.index] {
            Slot::Occupied { value, .. } => value.clone(),
            Slot::Free { .. } => unreachable!("dangling object ref"),
        }
    }

    pub fn ref_count(&self) -> usize {
        let inner = self.inner.borrow();
        match &inner.slots[self.index] {
            Slot::Occupied { ref_count, .. } => *ref_count,
            Slot::Free { .. } => 0,
        }
    }

    pub fn slot_index(&self) -> usize {
        self.index
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        let mut inner = self.inner.borrow_mut();
        if let Slot::Occupied { ref_count, .. } = &mut inner.slots[self.index] {
            *ref_count += 1;
        }
        drop(inner);
        ObjectRef { inner: self.inner.clone(), index: self.index }
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        let should_free = match &mut inner.slots[self.index] {
            Slot::Occupied { ref_count, .. } => {
                *ref_count -= 1;
                *ref_count == 0
            }
            Slot::Free { .. } => false,
        };
        if should_free {
            let old_head = inner.free_head;
            inner.slots[self.index] = Slot::Free { next: old_head };
            inner.free_head = Some(self.index);
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn make_allocates_and_drop_frees_to_the_free_list() {
        let pool = Pool::new();
        let a = pool.make(Value::Double(1.0));
        assert_eq!(pool.slot_count(), 1);
        assert_eq!(pool.free_count(), 0);
        drop(a);
        assert_eq!(pool.slot_count(), 1);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn free_slots_are_reused_before_growing() {
        let pool = Pool::new();
        let a = pool.make(Value::Double(1.0));
        drop(a);
        let b = pool.make(Value::Double(2.0));
        assert_eq!(pool.slot_count(), 1);
        assert_eq!(b.get().as_double().unwrap(), 2.0);
    }

    #[test]
    fn cloning_a_ref_increments_the_slot_ref_count() {
        let pool = Pool::new();
        let a = pool.make(Value::Double(1.0));
        assert_eq!(a.ref_count(), 1);
        let b = a.clone();
        assert_eq!(a.ref_count(), 2);
        drop(b);
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn every_slot_is_free_once_every_ref_is_released() {
        let pool = Pool::new();
        {
            let a = pool.make(Value::Double(1.0));
            let b = pool.make(Value::String(Rc::from("x")));
            let c = a.clone();
            drop(a);
            drop(b);
            drop(c);
        }
        assert_eq!(pool.free_count(), pool.slot_count());
    }
}
