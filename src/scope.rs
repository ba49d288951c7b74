//! The lexical scope "cactus stack": an arena of hashmap frames with
//! parent pointers. Only the path from a handle back to the root is ever
//! walked; arms elsewhere in the arena may belong to sibling closures and
//! are never visited from here.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LoxError, LoxResult};
use crate::pool::ObjectRef;
use crate::token::TokenId;

enum Arm {
    Occupied { ref_count: usize, parent: Option<usize>, bindings: HashMap<TokenId, ObjectRef> },
    Free { next: Option<usize> },
}

struct ScopeInner {
    arms: Vec<Arm>,
    free_head: Option<usize>,
}

const ROOT_INDEX: usize = 0;

/// A handle (arena pointer, arm index). Cloning bumps the arm's ref count;
/// dropping the last handle to a non-root arm clears it and returns it to
/// the free list. The root arm is pinned for the session's lifetime.
pub struct ScopeHandle {
    inner: Rc<RefCell<ScopeInner>>,
    index: usize,
}

impl ScopeHandle {
    /// Create a fresh cactus with just a root arm and return a handle to it.
    pub fn new_root() -> Self {
        let inner = Rc::new(RefCell::new(ScopeInner {
            arms: vec![Arm::Occupied { ref_count: 1, parent: None, bindings: HashMap::new() }],
            free_head: None,
        }));
        ScopeHandle { inner, index: ROOT_INDEX }
    }

    /// Allocate a new arm whose parent is `self`, returning a handle to it.
    pub fn make_child(&self) -> ScopeHandle {
        let mut inner = self.inner.borrow_mut();
        let arm = Arm::Occupied { ref_count: 1, parent: Some(self.index), bindings: HashMap::new() };
        let index = match inner.free_head {
            Some(free) => {
                let next = match inner.arms[free] {
                    Arm::Free { next } => next,
                    Arm::Occupied { .. } => unreachable!(),
                };
                inner.free_head = next;
                inner.arms[free] = arm;
                free
            }
            None => {
                inner.arms.push(arm);
                inner.arms.len() - 1
            }
        };
        // The parent arm now has one more child referencing it.
        if let Arm::Occupied { ref_count, .. } = &mut inner.arms[self.index] {
            *ref_count += 1;
        }
        drop(inner);
        ScopeHandle { inner: self.inner.clone(), index }
    }

    /// Walk from `self` to the root, returning the first binding of `key`.
    pub fn get(&self, key: TokenId) -> LoxResult<ObjectRef> {
        let inner = self.inner.borrow();
        let mut cursor = Some(self.index);
        while let Some(idx) = cursor {
            match &inner.arms[idx] {
                Arm::Occupied { bindings, parent, .. } => {
                    if let Some(value) = bindings.get(&key) {
                        return Ok(value.clone());
                    }
                    cursor = *parent;
                }
                Arm::Free { .. } => unreachable!("dangling scope handle"),
            }
        }
        Err(LoxError::minor("undefined name"))
    }

    /// Walk exactly `distance` parents, then look up `key` in that arm only.
    pub fn get_at(&self, key: TokenId, distance: usize) -> LoxResult<ObjectRef> {
        let inner = self.inner.borrow();
        let mut idx = self.index;
        for _ in 0..distance {
            idx = match &inner.arms[idx] {
                Arm::Occupied { parent, .. } => parent.ok_or_else(|| LoxError::assert("scope distance exceeds cactus depth"))?,
                Arm::Free { .. } => unreachable!("dangling scope handle"),
            };
        }
        match &inner.arms[idx] {
            Arm::Occupied { bindings, .. } => {
                bindings.get(&key).cloned().ok_or_else(|| LoxError::minor("undefined name at fixed depth"))
            }
            Arm::Free { .. } => unreachable!("dangling scope handle"),
        }
    }

    /// Like `get`, but updates the binding in place; fails if `key` is not
    /// found anywhere on the path to the root.
    pub fn assign(&self, key: TokenId, value: ObjectRef) -> LoxResult<()> {
        let mut inner = self.inner.borrow_mut();
        let mut cursor = Some(self.index);
        while let Some(idx) = cursor {
            let next = match &mut inner.arms[idx] {
                Arm::Occupied { bindings, parent, .. } => {
                    if bindings.contains_key(&key) {
                        bindings.insert(key, value);
                        return Ok(());
                    }
                    *parent
                }
                Arm::Free { .. } => unreachable!("dangling scope handle"),
            };
            cursor = next;
        }
        Err(LoxError::minor("undefined name in assignment"))
    }

    /// Insert `key` into the current arm only; fails if already present.
    pub fn define(&self, key: TokenId, value: ObjectRef) -> LoxResult<()> {
        let mut inner = self.inner.borrow_mut();
        match &mut inner.arms[self.index] {
            Arm::Occupied { bindings, .. } => {
                if bindings.contains_key(&key) {
                    return Err(LoxError::minor("name already defined in this scope"));
                }
                bindings.insert(key, value);
                Ok(())
            }
            Arm::Free { .. } => unreachable!("dangling scope handle"),
        }
    }

    /// Depth of `self` from the root, walking parent links. Used only by
    /// tests to confirm the cactus always terminates.
    pub fn depth(&self) -> usize {
        let inner = self.inner.borrow();
        let mut idx = self.index;
        let mut depth = 0;
        loop {
            match &inner.arms[idx] {
                Arm::Occupied { parent: Some(p), .. } => {
                    idx = *p;
                    depth += 1;
                }
                Arm::Occupied { parent: None, .. } => return depth,
                Arm::Free { .. } => unreachable!("dangling scope handle"),
            }
        }
    }
}

impl Clone for ScopeHandle {
    fn clone(&self) -> Self {
        let mut inner = self.inner.borrow_mut();
        if let Arm::Occupied { ref_count, .. } = &mut inner.arms[self.index] {
            *ref_count += 1;
        }
        drop(inner);
        ScopeHandle { inner: self.inner.clone(), index: self.index }
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if self.index == ROOT_INDEX {
            // The root arm is pinned for the session; never free it here.
            return;
        }
        let mut inner = self.inner.borrow_mut();
        let freed_parent = match &mut inner.arms[self.index] {
            Arm::Occupied { ref_count, parent, .. } => {
                *ref_count -= 1;
                if *ref_count == 0 {
                    Some(*parent)
                } else {
                    None
                }
            }
            Arm::Free { .. } => None,
        };
        if let Some(parent) = freed_parent {
            let old_head = inner.free_head;
            inner.arms[self.index] = Arm::Free { next: old_head };
            inner.free_head = Some(self.index);
            drop(inner);
            if let Some(parent_index) = parent {
                // Releasing this arm releases its reference to its parent.
                let handle = ScopeHandle { inner: self.inner.clone(), index: parent_index };
                drop(handle);
            }
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::pool::Pool;
    use crate::value::Value;

    #[test]
    fn child_sees_bindings_defined_in_ancestors() {
        let pool = Pool::new();
        let root = ScopeHandle::new_root();
        root.define(TokenId(1), pool.make(Value::Double(1.0))).unwrap();
        let child = root.make_child();
        assert_eq!(child.get(TokenId(1)).unwrap().get().as_double().unwrap(), 1.0);
    }

    #[test]
    fn shadowing_does_not_mutate_the_parent_arm() {
        let pool = Pool::new();
        let root = ScopeHandle::new_root();
        root.define(TokenId(1), pool.make(Value::Double(1.0))).unwrap();
        let child = root.make_child();
        child.define(TokenId(1), pool.make(Value::Double(2.0))).unwrap();
        assert_eq!(root.get(TokenId(1)).unwrap().get().as_double().unwrap(), 1.0);
        assert_eq!(child.get(TokenId(1)).unwrap().get().as_double().unwrap(), 2.0);
    }

    #[test]
    fn assign_mutates_the_arm_that_owns_the_name() {
        let pool = Pool::new();
        let root = ScopeHandle::new_root();
        root.define(TokenId(1), pool.make(Value::Double(1.0))).unwrap();
        let child = root.make_child();
        child.assign(TokenId(1), pool.make(Value::Double(9.0))).unwrap();
        assert_eq!(root.get(TokenId(1)).unwrap().get().as_double().unwrap(), 9.0);
    }

    #[test]
    fn two_closures_sharing_an_arm_see_each_others_mutations() {
        let pool = Pool::new();
        let root = ScopeHandle::new_root();
        let shared = root.make_child();
        shared.define(TokenId(1), pool.make(Value::Double(0.0))).unwrap();
        let closure_a = shared.clone();
        let closure_b = shared.clone();
        closure_a.assign(TokenId(1), pool.make(Value::Double(5.0))).unwrap();
        assert_eq!(closure_b.get(TokenId(1)).unwrap().get().as_double().unwrap(), 5.0);
    }

    #[test]
    fn scope_path_always_terminates_at_the_root() {
        let root = ScopeHandle::new_root();
        let mut current = root.make_child();
        for _ in 0..10 {
            current = current.make_child();
        }
        assert_eq!(current.depth(), 11);
    }

    #[test]
    fn get_at_fixed_distance_skips_the_walk() {
        let pool = Pool::new();
        let root = ScopeHandle::new_root();
        root.define(TokenId(1), pool.make(Value::Double(7.0))).unwrap();
        let a = root.make_child();
        let b = a.make_child();
        assert_eq!(b.get_at(TokenId(1), 2).unwrap().get().as_double().unwrap(), 7.0);
    }

    #[test]
    fn defining_the_same_name_twice_locally_fails() {
        let pool = Pool::new();
        let root = ScopeHandle::new_root();
        root.define(TokenId(1), pool.make(Value::Double(1.0))).unwrap();
        assert!(root.define(TokenId(1), pool.make(Value::Double(2.0))).is_err());
    }
}
