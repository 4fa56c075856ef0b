//! Dependency lists gating effect replay and memo recomputation.
//!
//! A hook that takes [`Deps`] re-runs its callback when the list differs from
//! the one recorded on its previous run. Elements are compared one by one with
//! their own `PartialEq`; nothing is compared structurally beyond that. Use
//! [`Dep::ptr`] when a value should be compared by identity instead.
//!
//! ```rust
//! use tether_core::*;
//!
//! let a = deps![1, "x"];
//! let b = deps![1, "x"];
//! assert!(!a.changed_from(Some(&b)));
//! assert!(deps![2, "x"].changed_from(Some(&b)));
//! assert!(Deps::Always.changed_from(Some(&b)));
//! ```

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

pub type DepList = SmallVec<[Dep; 4]>;

/// A value that can take part in a dependency list.
pub trait DepValue: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn dep_eq(&self, other: &dyn DepValue) -> bool;
}

impl<T: PartialEq + fmt::Debug + 'static> DepValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dep_eq(&self, other: &dyn DepValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// One element of a dependency list.
pub struct Dep(Box<dyn DepValue>);

impl Dep {
    pub fn new<T: PartialEq + fmt::Debug + 'static>(value: T) -> Self {
        Dep(Box::new(value))
    }

    /// Compares by `Rc` identity rather than by value.
    pub fn ptr<T: ?Sized + 'static>(rc: &Rc<T>) -> Self {
        Dep(Box::new(ByPtr(rc.clone())))
    }

    pub fn same(&self, other: &Dep) -> bool {
        self.0.dep_eq(&*other.0)
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

struct ByPtr<T: ?Sized>(Rc<T>);

impl<T: ?Sized> PartialEq for ByPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> fmt::Debug for ByPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ptr({:p})", Rc::as_ptr(&self.0))
    }
}

/// Dependency argument of `use_effect`, `use_layout_effect`, `use_memo` and `use_callback`.
#[derive(Debug)]
pub enum Deps {
    /// No dependency argument: run after every render.
    Always,
    /// Run when any element differs. An empty list runs once.
    List(DepList),
}

impl Deps {
    pub fn once() -> Self {
        Deps::List(DepList::new())
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Deps::Always => None,
            Deps::List(list) => Some(list.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Deps::List(list) if list.is_empty())
    }

    /// Whether a hook recorded with `previous` has to run again for `self`.
    ///
    /// A list whose length differs from the recorded one counts as changed;
    /// [`Deps::length_mismatch`] lets callers report it.
    pub fn changed_from(&self, previous: Option<&Deps>) -> bool {
        match (self, previous) {
            (Deps::Always, _) | (_, None) | (_, Some(Deps::Always)) => true,
            (Deps::List(next), Some(Deps::List(prev))) => {
                next.len() != prev.len() || next.iter().zip(prev.iter()).any(|(n, p)| !n.same(p))
            }
        }
    }

    /// `Some((previous, current))` when both are lists of different lengths.
    pub fn length_mismatch(&self, previous: Option<&Deps>) -> Option<(usize, usize)> {
        match (previous, self) {
            (Some(Deps::List(prev)), Deps::List(next)) if prev.len() != next.len() => {
                Some((prev.len(), next.len()))
            }
            _ => None,
        }
    }
}

/// Builds a [`Deps::List`]; `deps![]` is the run-once list.
#[macro_export]
macro_rules! deps {
    () => {
        $crate::deps::Deps::once()
    };
    ($($value:expr),+ $(,)?) => {{
        let mut list = $crate::deps::DepList::new();
        $( list.push($crate::deps::Dep::new($value)); )+
        $crate::deps::Deps::List(list)
    }};
}
