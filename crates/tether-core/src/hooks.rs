use std::rc::Rc;

use crate::context::{Context, ContextRegistry};
use crate::deps::Deps;
use crate::effects::{EffectKind, EffectOutput, PendingEffect};
use crate::error::{BoxError, HookError};
use crate::ledger::HookLedger;
use crate::slot::{
    EffectSlot, MemoSlot, ReducerCell, ReducerFn, RefSlot, Slot, SlotKind, StateCell,
    UpdatableSlot,
};
use crate::state::{Dispatch, Ref, SetState};

/// Render context handed to a component for one render pass.
///
/// Every `use_*` call claims the next slot of the instance's ledger. Calls must
/// happen unconditionally and in the same order on every render; a mismatch is
/// reported as a "hook order violated" error instead of handing one slot's data
/// to another hook. Dropping the context without calling [`Hooks::finish`]
/// abandons the render.
pub struct Hooks<'a> {
    ledger: &'a mut HookLedger,
    contexts: &'a ContextRegistry,
    cursor: usize,
    finished: bool,
}

impl<'a> Hooks<'a> {
    pub(crate) fn new(ledger: &'a mut HookLedger, contexts: &'a ContextRegistry) -> Self {
        Self {
            ledger,
            contexts,
            cursor: 0,
            finished: false,
        }
    }

    /// Ends the render and checks that it registered as many hooks as the first one.
    pub fn finish(mut self) -> Result<(), HookError> {
        self.finished = true;
        self.ledger.end_render(self.cursor)
    }

    pub fn is_first_render(&self) -> bool {
        !self.ledger.mounted
    }

    /// Number of slots claimed so far in this render.
    pub fn registered(&self) -> usize {
        self.cursor
    }

    fn register(&mut self, slot: Slot) -> usize {
        let index = self.cursor;
        self.ledger.slots.push(slot);
        self.cursor += 1;
        index
    }

    fn existing(&mut self) -> Result<(usize, &mut Slot), HookError> {
        let index = self.cursor;
        self.cursor += 1;
        let expected = self.ledger.slots.len();
        match self.ledger.slots.get_mut(index) {
            Some(slot) => Ok((index, slot)),
            None => Err(HookError::HookCountMismatch {
                expected,
                actual: index + 1,
            }),
        }
    }

    /// State slot. `init` runs on the first render only; later renders return
    /// the value committed before this render started.
    pub fn use_state<T>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Result<(T, SetState<T>), HookError>
    where
        T: Clone + PartialEq + 'static,
    {
        if self.is_first_render() {
            let cell = Rc::new(StateCell::new(init(), self.ledger.notifier.clone()));
            self.register(Slot::State(UpdatableSlot {
                cell: cell.clone(),
                updates: cell.clone(),
            }));
            return Ok((cell.get(), SetState::new(cell)));
        }

        let (index, slot) = self.existing()?;
        let state = match slot {
            Slot::State(state) => state,
            other => return Err(mismatch(index, other, SlotKind::State)),
        };
        let cell = state
            .cell
            .clone()
            .downcast::<StateCell<T>>()
            .map_err(|_| HookError::SlotTypeMismatch {
                index,
                kind: SlotKind::State,
            })?;
        Ok((cell.get(), SetState::new(cell)))
    }

    /// Like [`Hooks::use_state`] with an eagerly built initial value.
    pub fn use_state_value<T>(&mut self, initial: T) -> Result<(T, SetState<T>), HookError>
    where
        T: Clone + PartialEq + 'static,
    {
        self.use_state(move || initial)
    }

    pub fn use_reducer<S, A, E, R>(
        &mut self,
        reducer: R,
        initial: S,
    ) -> Result<(S, Dispatch<A>), HookError>
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
        E: Into<BoxError>,
        R: Fn(&S, A) -> Result<S, E> + 'static,
    {
        self.use_reducer_with(reducer, initial, |state| state)
    }

    /// Reducer slot whose initial state is `init(arg)`, computed on the first render only.
    pub fn use_reducer_with<S, A, E, R, I>(
        &mut self,
        reducer: R,
        arg: I,
        init: impl FnOnce(I) -> S,
    ) -> Result<(S, Dispatch<A>), HookError>
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
        E: Into<BoxError>,
        R: Fn(&S, A) -> Result<S, E> + 'static,
    {
        let reducer: ReducerFn<S, A> = Rc::new(move |state: &S, action: A| {
            reducer(state, action).map_err(Into::<BoxError>::into)
        });

        if self.is_first_render() {
            let cell = Rc::new(ReducerCell::new(
                init(arg),
                reducer,
                self.ledger.notifier.clone(),
            ));
            self.register(Slot::Reducer(UpdatableSlot {
                cell: cell.clone(),
                updates: cell.clone(),
            }));
            return Ok((cell.get(), Dispatch::new(cell)));
        }

        let (index, slot) = self.existing()?;
        let state = match slot {
            Slot::Reducer(state) => state,
            other => return Err(mismatch(index, other, SlotKind::Reducer)),
        };
        let cell = state
            .cell
            .clone()
            .downcast::<ReducerCell<S, A>>()
            .map_err(|_| HookError::SlotTypeMismatch {
                index,
                kind: SlotKind::Reducer,
            })?;
        cell.replace_reducer(reducer);
        Ok((cell.get(), Dispatch::new(cell)))
    }

    /// Passive effect: runs after the commit, when the scheduler flushes effects.
    pub fn use_effect<F, R>(&mut self, deps: Deps, callback: F) -> Result<(), HookError>
    where
        F: FnOnce() -> R + 'static,
        R: EffectOutput,
    {
        self.effect(EffectKind::Passive, deps, callback)
    }

    /// Layout effect: runs synchronously inside the commit, before any passive effect.
    pub fn use_layout_effect<F, R>(&mut self, deps: Deps, callback: F) -> Result<(), HookError>
    where
        F: FnOnce() -> R + 'static,
        R: EffectOutput,
    {
        self.effect(EffectKind::Layout, deps, callback)
    }

    fn effect<F, R>(&mut self, kind: EffectKind, deps: Deps, callback: F) -> Result<(), HookError>
    where
        F: FnOnce() -> R + 'static,
        R: EffectOutput,
    {
        let expected = match kind {
            EffectKind::Passive => SlotKind::Effect,
            EffectKind::Layout => SlotKind::LayoutEffect,
        };

        let strict = self.ledger.strict_deps;
        let index = if self.is_first_render() {
            self.register(Slot::Effect(EffectSlot {
                kind,
                deps: None,
                cleanup: None,
                runs: 0,
            }))
        } else {
            let (index, slot) = self.existing()?;
            let previous = match slot {
                Slot::Effect(effect) if effect.kind == kind => &effect.deps,
                other => return Err(mismatch(index, other, expected)),
            };
            check_length(strict, index, deps.length_mismatch(previous.as_ref()))?;
            if !deps.changed_from(previous.as_ref()) {
                return Ok(());
            }
            index
        };

        self.ledger
            .staged
            .push(PendingEffect::new(index, kind, deps, callback));
        Ok(())
    }

    /// Memoized value, recomputed when `deps` change. Recomputing on every
    /// render (see `RuntimeConfig::memoize`) must not change what the
    /// component observes.
    pub fn use_memo<T: 'static>(
        &mut self,
        deps: Deps,
        producer: impl FnOnce() -> T,
    ) -> Result<Rc<T>, HookError> {
        if self.is_first_render() {
            let value = Rc::new(producer());
            self.register(Slot::Memo(MemoSlot {
                value: Box::new(value.clone()),
                deps,
                computations: 1,
            }));
            return Ok(value);
        }

        let memoize = self.ledger.memoize;
        let strict = self.ledger.strict_deps;
        let (index, slot) = self.existing()?;
        let memo = match slot {
            Slot::Memo(memo) => memo,
            other => return Err(mismatch(index, other, SlotKind::Memo)),
        };
        let Some(cached) = memo.value.downcast_ref::<Rc<T>>().cloned() else {
            return Err(HookError::SlotTypeMismatch {
                index,
                kind: SlotKind::Memo,
            });
        };
        check_length(strict, index, deps.length_mismatch(Some(&memo.deps)))?;
        if !memoize || deps.changed_from(Some(&memo.deps)) {
            let value = Rc::new(producer());
            memo.value = Box::new(value.clone());
            memo.deps = deps;
            memo.computations += 1;
            return Ok(value);
        }
        Ok(cached)
    }

    /// Memoized function: the same `Rc` is returned until `deps` change.
    pub fn use_callback<F: 'static>(&mut self, deps: Deps, f: F) -> Result<Rc<F>, HookError> {
        self.use_memo(deps, move || f)
    }

    /// Ref slot. `init` runs on the first render only; the returned cell is the
    /// same on every render.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Result<Ref<T>, HookError> {
        if self.is_first_render() {
            let cell = Ref::new(init());
            self.register(Slot::Ref(RefSlot {
                cell: Box::new(cell.clone()),
            }));
            return Ok(cell);
        }

        let (index, slot) = self.existing()?;
        let cell = match slot {
            Slot::Ref(r) => &r.cell,
            other => return Err(mismatch(index, other, SlotKind::Ref)),
        };
        cell.downcast_ref::<Ref<T>>()
            .cloned()
            .ok_or(HookError::SlotTypeMismatch {
                index,
                kind: SlotKind::Ref,
            })
    }

    /// Reads a context. Does not claim a slot; the instance is re-rendered
    /// when the provided value changes.
    pub fn use_context<T: 'static>(&mut self, ctx: &Context<T>) -> Rc<T> {
        if !self.ledger.context_reads.contains(&ctx.id()) {
            self.ledger.context_reads.push(ctx.id());
        }
        self.contexts.get(ctx)
    }
}

impl Drop for Hooks<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("render abandoned after {} hooks", self.cursor);
            self.ledger.abort_render();
        }
    }
}

fn mismatch(index: usize, found_slot: &Slot, requested: SlotKind) -> HookError {
    HookError::SlotKindMismatch {
        index,
        expected: found_slot.kind(),
        found: requested,
    }
}

fn check_length(
    strict: bool,
    index: usize,
    mismatch: Option<(usize, usize)>,
) -> Result<(), HookError> {
    let Some((previous, current)) = mismatch else {
        return Ok(());
    };
    if strict {
        return Err(HookError::DepsLengthChanged {
            index,
            previous,
            current,
        });
    }
    log::warn!(
        "dependency list of slot {index} changed length from {previous} to {current}; \
         treating it as changed"
    );
    Ok(())
}
