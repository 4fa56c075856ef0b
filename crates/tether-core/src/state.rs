use std::cell::{Ref as CellRef, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::slot::{ReducerCell, StateCell, Update};

/// Update function returned by `use_state`.
///
/// Writes are queued and applied, in call order, right before the owning
/// instance renders again. The handle is the same object on every render.
pub struct SetState<T> {
    cell: Rc<StateCell<T>>,
}

impl<T: Clone + PartialEq + 'static> SetState<T> {
    pub(crate) fn new(cell: Rc<StateCell<T>>) -> Self {
        Self { cell }
    }

    /// Schedules `value` as the next value.
    pub fn set(&self, value: T) {
        self.cell.enqueue(Update::Replace(value));
    }

    /// Schedules `f(current)` as the next value, where `current` is the value
    /// produced by the writes queued before this one.
    pub fn update(&self, f: impl FnOnce(&T) -> T + 'static) {
        self.cell.enqueue(Update::Transform(Box::new(f)));
    }
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> PartialEq for SetState<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetState({:p})", Rc::as_ptr(&self.cell))
    }
}

/// Action sink behind a [`Dispatch`], erasing the reducer's state type.
pub(crate) trait ActionSink<A> {
    fn push(&self, action: A);
}

impl<S: Clone + PartialEq + 'static, A: 'static> ActionSink<A> for ReducerCell<S, A> {
    fn push(&self, action: A) {
        self.dispatch(action);
    }
}

/// Dispatch function returned by `use_reducer`; identity-stable across renders.
pub struct Dispatch<A> {
    sink: Rc<dyn ActionSink<A>>,
}

impl<A: 'static> Dispatch<A> {
    pub(crate) fn new(sink: Rc<dyn ActionSink<A>>) -> Self {
        Self { sink }
    }

    pub fn dispatch(&self, action: A) {
        self.sink.push(action);
    }
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<A> PartialEq for Dispatch<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.sink, &other.sink)
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatch({:p})", Rc::as_ptr(&self.sink))
    }
}

/// Mutable cell returned by `use_ref`.
///
/// The same cell is handed out for the whole lifetime of the instance. Writes
/// are visible immediately and never schedule a render.
pub struct Ref<T>(Rc<RefCell<T>>);

impl<T> Ref<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    pub fn current(&self) -> T
    where
        T: Clone,
    {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    pub fn replace(&self, value: T) -> T {
        self.0.replace(value)
    }

    pub fn borrow(&self) -> CellRef<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }
}

impl<T: Default> Ref<T> {
    pub fn take(&self) -> T {
        self.0.take()
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({:p})", Rc::as_ptr(&self.0))
    }
}
