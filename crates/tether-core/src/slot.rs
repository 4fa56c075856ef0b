//! Slot storage behind a [`HookLedger`](crate::HookLedger).
//!
//! Every hook call owns one [`Slot`], addressed purely by its position in the
//! render. The set of kinds is closed, so the ledger matches on it instead of
//! dispatching through a trait object. Values of arbitrary type live behind
//! `dyn Any` inside the variants and are downcast by the hook that owns them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use crate::deps::Deps;
use crate::effects::{Cleanup, EffectKind};
use crate::error::BoxError;
use crate::runtime::{InstanceId, Mailbox};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SlotKind {
    State,
    Effect,
    LayoutEffect,
    Memo,
    Ref,
    Reducer,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotKind::State => "state",
            SlotKind::Effect => "effect",
            SlotKind::LayoutEffect => "layout effect",
            SlotKind::Memo => "memo",
            SlotKind::Ref => "ref",
            SlotKind::Reducer => "reducer",
        })
    }
}

/// Read-only description of one slot, for tooling.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SlotInfo {
    pub index: usize,
    pub kind: SlotKind,
    /// Debug rendering of the recorded dependency list, `None` for slots without one
    /// or effects that have not run yet.
    pub deps: Option<String>,
    /// Effect invocations or memo computations so far.
    pub runs: u64,
    pub pending_updates: bool,
}

pub(crate) enum Slot {
    State(UpdatableSlot),
    Effect(EffectSlot),
    Memo(MemoSlot),
    Ref(RefSlot),
    Reducer(UpdatableSlot),
}

/// State and reducer slots: the typed cell plus its type-erased update queue.
pub(crate) struct UpdatableSlot {
    pub cell: Rc<dyn Any>,
    pub updates: Rc<dyn PendingUpdates>,
}

pub(crate) struct EffectSlot {
    pub kind: EffectKind,
    /// Deps of the last successful run; `None` before the first run and after
    /// a failed one, which forces the next commit to invoke it again.
    ///
    /// A cleanup is a `FnOnce` and runs right before the callback that replaces
    /// it. If that callback then fails, the cleanup is not run a second time
    /// before the retry: the failed invocation left nothing to clean up, and
    /// the earlier one was already cleaned.
    pub deps: Option<Deps>,
    pub cleanup: Option<Cleanup>,
    pub runs: u64,
}

pub(crate) struct MemoSlot {
    pub value: Box<dyn Any>,
    pub deps: Deps,
    pub computations: u64,
}

pub(crate) struct RefSlot {
    pub cell: Box<dyn Any>,
}

impl Slot {
    pub fn kind(&self) -> SlotKind {
        match self {
            Slot::State(_) => SlotKind::State,
            Slot::Effect(e) if e.kind == EffectKind::Layout => SlotKind::LayoutEffect,
            Slot::Effect(_) => SlotKind::Effect,
            Slot::Memo(_) => SlotKind::Memo,
            Slot::Ref(_) => SlotKind::Ref,
            Slot::Reducer(_) => SlotKind::Reducer,
        }
    }

    pub fn updates(&self) -> Option<&Rc<dyn PendingUpdates>> {
        match self {
            Slot::State(s) | Slot::Reducer(s) => Some(&s.updates),
            _ => None,
        }
    }

    pub fn info(&self, index: usize) -> SlotInfo {
        let (deps, runs) = match self {
            Slot::Effect(e) => (e.deps.as_ref().map(|d| format!("{d:?}")), e.runs),
            Slot::Memo(m) => (Some(format!("{:?}", m.deps)), m.computations),
            _ => (None, 0),
        };
        SlotInfo {
            index,
            kind: self.kind(),
            deps,
            runs,
            pending_updates: self.updates().is_some_and(|u| u.has_pending()),
        }
    }
}

/// Routes "this instance has pending updates" to the scheduler, and stops
/// accepting updates once the instance is gone.
pub(crate) struct Notifier {
    alive: Cell<bool>,
    waker: RefCell<Option<(InstanceId, Weak<Mailbox>)>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            alive: Cell::new(true),
            waker: RefCell::new(None),
        }
    }

    pub fn bind(&self, id: InstanceId, mailbox: &Rc<Mailbox>) {
        *self.waker.borrow_mut() = Some((id, Rc::downgrade(mailbox)));
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub fn kill(&self) {
        self.alive.set(false);
        self.waker.borrow_mut().take();
    }

    fn wake(&self) {
        if let Some((id, mailbox)) = self.waker.borrow().as_ref()
            && let Some(mailbox) = mailbox.upgrade()
        {
            mailbox.notify(*id);
        }
    }
}

/// Type-erased access to a slot's queued writes.
///
/// Writes go through two steps. `stage` folds the queue into a next value
/// that renders read but that is not yet committed; `commit_staged` makes it
/// the committed value once the render commits, `discard_staged` drops it when
/// the render is abandoned.
pub(crate) trait PendingUpdates {
    /// Applies every queued write in call order on top of the committed value.
    /// Returns whether the result differs from it.
    fn stage(&self) -> Result<bool, BoxError>;
    fn commit_staged(&self);
    fn discard_staged(&self);
    fn has_pending(&self) -> bool;
    fn discard_pending(&self);
}

pub(crate) enum Update<T> {
    Replace(T),
    Transform(Box<dyn FnOnce(&T) -> T>),
}

pub(crate) struct StateCell<T> {
    value: RefCell<T>,
    staged: RefCell<Option<T>>,
    queue: RefCell<VecDeque<Update<T>>>,
    notifier: Rc<Notifier>,
}

impl<T: Clone + PartialEq + 'static> StateCell<T> {
    pub fn new(value: T, notifier: Rc<Notifier>) -> Self {
        Self {
            value: RefCell::new(value),
            staged: RefCell::new(None),
            queue: RefCell::new(VecDeque::new()),
            notifier,
        }
    }

    /// The value the current render sees: staged if a render is pending,
    /// committed otherwise.
    pub fn get(&self) -> T {
        match &*self.staged.borrow() {
            Some(next) => next.clone(),
            None => self.value.borrow().clone(),
        }
    }

    pub fn enqueue(&self, update: Update<T>) {
        if !self.notifier.is_alive() {
            log::debug!("state update on an unmounted instance ignored");
            return;
        }
        self.queue.borrow_mut().push_back(update);
        self.notifier.wake();
    }
}

impl<T: Clone + PartialEq + 'static> PendingUpdates for StateCell<T> {
    fn stage(&self) -> Result<bool, BoxError> {
        let queued = mem::take(&mut *self.queue.borrow_mut());
        if queued.is_empty() {
            return Ok(self.staged.borrow().is_some());
        }
        let mut next = self.get();
        for update in queued {
            next = match update {
                Update::Replace(value) => value,
                Update::Transform(f) => f(&next),
            };
        }
        let changed = *self.value.borrow() != next;
        *self.staged.borrow_mut() = changed.then_some(next);
        Ok(changed)
    }

    fn commit_staged(&self) {
        if let Some(next) = self.staged.borrow_mut().take() {
            *self.value.borrow_mut() = next;
        }
    }

    fn discard_staged(&self) {
        self.staged.borrow_mut().take();
    }

    fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    fn discard_pending(&self) {
        self.queue.borrow_mut().clear();
        self.discard_staged();
    }
}

pub(crate) type ReducerFn<S, A> = Rc<dyn Fn(&S, A) -> Result<S, BoxError>>;

pub(crate) struct ReducerCell<S, A> {
    state: RefCell<S>,
    staged: RefCell<Option<S>>,
    actions: RefCell<VecDeque<A>>,
    reducer: RefCell<ReducerFn<S, A>>,
    notifier: Rc<Notifier>,
}

impl<S: Clone + PartialEq + 'static, A: 'static> ReducerCell<S, A> {
    pub fn new(state: S, reducer: ReducerFn<S, A>, notifier: Rc<Notifier>) -> Self {
        Self {
            state: RefCell::new(state),
            staged: RefCell::new(None),
            actions: RefCell::new(VecDeque::new()),
            reducer: RefCell::new(reducer),
            notifier,
        }
    }

    pub fn get(&self) -> S {
        match &*self.staged.borrow() {
            Some(next) => next.clone(),
            None => self.state.borrow().clone(),
        }
    }

    /// The reducer captured by the latest render wins.
    pub fn replace_reducer(&self, reducer: ReducerFn<S, A>) {
        *self.reducer.borrow_mut() = reducer;
    }

    pub fn dispatch(&self, action: A) {
        if !self.notifier.is_alive() {
            log::debug!("dispatch on an unmounted instance ignored");
            return;
        }
        self.actions.borrow_mut().push_back(action);
        self.notifier.wake();
    }
}

impl<S: Clone + PartialEq + 'static, A: 'static> PendingUpdates for ReducerCell<S, A> {
    fn stage(&self) -> Result<bool, BoxError> {
        let actions = mem::take(&mut *self.actions.borrow_mut());
        if actions.is_empty() {
            return Ok(self.staged.borrow().is_some());
        }
        let reducer = self.reducer.borrow().clone();
        let mut next = self.get();
        for action in actions {
            next = reducer(&next, action)?;
        }
        let changed = *self.state.borrow() != next;
        *self.staged.borrow_mut() = changed.then_some(next);
        Ok(changed)
    }

    fn commit_staged(&self) {
        if let Some(next) = self.staged.borrow_mut().take() {
            *self.state.borrow_mut() = next;
        }
    }

    fn discard_staged(&self) {
        self.staged.borrow_mut().take();
    }

    fn has_pending(&self) -> bool {
        !self.actions.borrow().is_empty()
    }

    fn discard_pending(&self) {
        self.actions.borrow_mut().clear();
        self.discard_staged();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_updates_apply_in_order() {
        let cell = StateCell::new(1, Rc::new(Notifier::new()));
        cell.enqueue(Update::Transform(Box::new(|v| v * 10)));
        cell.enqueue(Update::Replace(7));
        cell.enqueue(Update::Transform(Box::new(|v| v + 1)));
        assert!(cell.has_pending());
        assert!(cell.stage().unwrap());
        assert_eq!(cell.get(), 8);
        assert!(!cell.has_pending());
    }

    #[test]
    fn test_staged_value_is_committed_or_dropped() {
        let cell = StateCell::new(1, Rc::new(Notifier::new()));
        cell.enqueue(Update::Replace(2));
        assert!(cell.stage().unwrap());
        assert_eq!(cell.get(), 2);
        assert_eq!(*cell.value.borrow(), 1);

        cell.discard_staged();
        assert_eq!(cell.get(), 1);

        cell.enqueue(Update::Replace(3));
        assert!(cell.stage().unwrap());
        // A second flush before the render keeps building on the staged value.
        cell.enqueue(Update::Transform(Box::new(|v| v * 2)));
        assert!(cell.stage().unwrap());
        cell.commit_staged();
        assert_eq!(*cell.value.borrow(), 6);
        assert!(!cell.stage().unwrap());
    }

    #[test]
    fn test_state_net_noop_reports_unchanged() {
        let cell = StateCell::new(3, Rc::new(Notifier::new()));
        cell.enqueue(Update::Replace(4));
        cell.enqueue(Update::Replace(3));
        assert!(!cell.stage().unwrap());
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn test_dead_notifier_drops_updates() {
        let notifier = Rc::new(Notifier::new());
        let cell = StateCell::new(0, notifier.clone());
        notifier.kill();
        cell.enqueue(Update::Replace(5));
        assert!(!cell.has_pending());
    }

    #[test]
    fn test_reducer_error_keeps_state() {
        let reducer: ReducerFn<i32, &'static str> = Rc::new(|s: &i32, a: &'static str| match a {
            "inc" => Ok(s + 1),
            other => Err(format!("unknown action `{other}`").into()),
        });
        let cell = ReducerCell::new(0, reducer, Rc::new(Notifier::new()));
        cell.dispatch("inc");
        cell.dispatch("explode");
        let err = cell.stage().unwrap_err();
        assert_eq!(err.to_string(), "unknown action `explode`");
        assert_eq!(cell.get(), 0);
        assert!(!cell.has_pending());
    }
}
