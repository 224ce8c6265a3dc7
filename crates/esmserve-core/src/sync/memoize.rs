use std::fmt;
use std::sync::{Arc, Mutex};

/// Single-slot memoization.
///
/// Holds the result of the most recent call only. A call whose arguments
/// differ from the slot's evicts it and recomputes. Arguments compare by
/// value; wrap shared objects in [`ByAddress`] to compare by identity.
pub struct Memoize<A, T> {
    slot: Mutex<Option<(A, T)>>,
}

impl<A, T> Default for Memoize<A, T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<A, T> fmt::Debug for Memoize<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filled = self.slot.lock().map(|s| s.is_some()).unwrap_or(false);
        f.debug_struct("Memoize").field("filled", &filled).finish()
    }
}

impl<A: PartialEq, T: Clone> Memoize<A, T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `args`, computing it on a slot miss.
    pub fn get(&self, args: A, compute: impl FnOnce(&A) -> T) -> T {
        let mut slot = self.slot.lock().unwrap();
        if let Some((cached_args, value)) = slot.as_ref() {
            if *cached_args == args {
                return value.clone();
            }
        }
        let value = compute(&args);
        *slot = Some((args, value.clone()));
        value
    }

    /// Drop the cached value.
    pub fn clear(&self) {
        *self.slot.lock().unwrap() = None;
    }
}

/// Compares an `Arc` by pointer identity instead of by value.
#[derive(Debug)]
pub struct ByAddress<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> Clone for ByAddress<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for ByAddress<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Eq for ByAddress<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_same_args_compute_once() {
        let memo = Memoize::new();
        let calls = Cell::new(0);
        let square = |x: &i32| {
            calls.set(calls.get() + 1);
            x * x
        };

        assert_eq!(memo.get(0, square), 0);
        assert_eq!(memo.get(0, square), 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_changed_args_evict_single_slot() {
        let memo = Memoize::new();
        let calls = Cell::new(0);
        let double = |x: &i32| {
            calls.set(calls.get() + 1);
            x * 2
        };

        memo.get(0, double);
        memo.get(1, double);
        memo.get(0, double);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_identity_comparison() {
        let memo: Memoize<ByAddress<String>, usize> = Memoize::new();
        let calls = Cell::new(0);
        let len = |s: &ByAddress<String>| {
            calls.set(calls.get() + 1);
            s.0.len()
        };

        let a = Arc::new("same".to_string());
        let b = Arc::new("same".to_string());

        memo.get(ByAddress(Arc::clone(&a)), len);
        memo.get(ByAddress(Arc::clone(&a)), len);
        assert_eq!(calls.get(), 1);

        // Equal value, different object
        memo.get(ByAddress(b), len);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_clear() {
        let memo = Memoize::new();
        let calls = Cell::new(0);
        let id = |x: &u8| {
            calls.set(calls.get() + 1);
            *x
        };
        memo.get(7, id);
        memo.clear();
        memo.get(7, id);
        assert_eq!(calls.get(), 2);
    }
}
