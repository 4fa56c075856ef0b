//! # Hook ledger
//!
//! One [`HookLedger`] per component instance. It stores the instance's slots
//! in first-registration order and drives the render → commit → effects cycle:
//!
//! ```text
//! Unmounted ─begin_render─▶ Mounting ─finish─▶ Committing ─commit─▶ Idle
//!                                                   ▲                 │
//!                                                finish          begin_render
//!                                                   │                 ▼
//!                                                   └──────────── Rendering
//! Idle ─unmount─▶ Unmounting ─▶ Unmounted (terminal)
//! ```
//!
//! The ledger can be driven directly, without a [`Runtime`](crate::Runtime):
//!
//! ```rust
//! use tether_core::*;
//!
//! let contexts = ContextRegistry::default();
//! let mut ledger = HookLedger::new();
//!
//! let mut hooks = ledger.begin_render(&contexts).unwrap();
//! let (count, set_count) = hooks.use_state(|| 0).unwrap();
//! hooks.finish().unwrap();
//! ledger.commit().unwrap();
//! assert_eq!(count, 0);
//!
//! set_count.update(|c| c + 1);
//! set_count.update(|c| c + 1);
//! assert!(ledger.flush_updates().unwrap());
//!
//! let mut hooks = ledger.begin_render(&contexts).unwrap();
//! let (count, _) = hooks.use_state(|| 0).unwrap();
//! hooks.finish().unwrap();
//! ledger.commit().unwrap();
//! assert_eq!(count, 2);
//! ```

use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::context::{ContextId, ContextRegistry};
use crate::effects::{EffectKind, PendingEffect};
use crate::error::HookError;
use crate::hooks::Hooks;
use crate::runtime::{InstanceId, Mailbox, RuntimeConfig};
use crate::slot::{Notifier, Slot, SlotInfo, SlotKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Lifecycle {
    /// Before the first render, and terminally after unmount.
    Unmounted,
    /// First render: slots are being created in call order.
    Mounting,
    /// Committed, waiting for the next trigger.
    Idle,
    /// Re-render: slots are matched by position.
    Rendering,
    /// Render finished, output not yet committed.
    Committing,
    Unmounting,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LedgerStats {
    pub renders: u64,
    pub commits: u64,
    pub effects_run: u64,
    pub cleanups_run: u64,
}

pub struct HookLedger {
    pub(crate) slots: Vec<Slot>,
    lifecycle: Lifecycle,
    pub(crate) mounted: bool,
    disposed: bool,
    /// Effects queued by the render in progress, waiting for `commit`.
    pub(crate) staged: Vec<PendingEffect>,
    /// Committed passive effects, waiting for `flush_effects`.
    passive: VecDeque<PendingEffect>,
    pub(crate) notifier: Rc<Notifier>,
    pub(crate) context_reads: SmallVec<[ContextId; 2]>,
    pub(crate) memoize: bool,
    pub(crate) strict_deps: bool,
    stats: LedgerStats,
}

impl Default for HookLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl HookLedger {
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    pub fn with_config(config: &RuntimeConfig) -> Self {
        Self {
            slots: Vec::new(),
            lifecycle: Lifecycle::Unmounted,
            mounted: false,
            disposed: false,
            staged: Vec::new(),
            passive: VecDeque::new(),
            notifier: Rc::new(Notifier::new()),
            context_reads: SmallVec::new(),
            memoize: config.memoize,
            strict_deps: config.strict_deps,
            stats: LedgerStats::default(),
        }
    }

    pub(crate) fn bind(&self, id: InstanceId, mailbox: &Rc<Mailbox>) {
        self.notifier.bind(id, mailbox);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn stats(&self) -> LedgerStats {
        self.stats
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted && !self.disposed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn reads_context(&self, id: ContextId) -> bool {
        self.context_reads.contains(&id)
    }

    pub fn describe(&self) -> Vec<SlotInfo> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| slot.info(index))
            .collect()
    }

    pub fn kinds(&self) -> Vec<SlotKind> {
        self.slots.iter().map(Slot::kind).collect()
    }

    /// Opens a render pass. Passive effects left over from the previous commit
    /// run first, so one commit's effects never interleave with the next.
    pub fn begin_render<'a>(
        &'a mut self,
        contexts: &'a ContextRegistry,
    ) -> Result<Hooks<'a>, HookError> {
        if self.disposed {
            return Err(HookError::InvalidContext(
                "cannot render an instance after it was unmounted",
            ));
        }
        match self.lifecycle {
            Lifecycle::Unmounted | Lifecycle::Idle => {}
            Lifecycle::Committing => {
                return Err(HookError::InvalidContext(
                    "the previous render has not been committed",
                ));
            }
            _ => {
                return Err(HookError::InvalidContext(
                    "a render is already in progress",
                ));
            }
        }
        if let Err(err) = self.flush_effects() {
            self.discard_staged();
            return Err(err);
        }

        self.lifecycle = if self.mounted {
            Lifecycle::Rendering
        } else {
            Lifecycle::Mounting
        };
        self.staged.clear();
        self.context_reads.clear();
        Ok(Hooks::new(self, contexts))
    }

    /// Called by [`Hooks::finish`] with the number of registrations made.
    pub(crate) fn end_render(&mut self, registered: usize) -> Result<(), HookError> {
        if self.mounted && registered != self.slots.len() {
            let expected = self.slots.len();
            self.abort_render();
            return Err(HookError::HookCountMismatch {
                expected,
                actual: registered,
            });
        }
        self.mounted = true;
        self.stats.renders += 1;
        self.lifecycle = Lifecycle::Committing;
        Ok(())
    }

    /// Discards whatever the failed render queued. A failed first render
    /// leaves no slots behind.
    pub(crate) fn abort_render(&mut self) {
        self.staged.clear();
        self.discard_staged();
        if self.mounted {
            self.lifecycle = Lifecycle::Idle;
        } else {
            self.slots.clear();
            self.lifecycle = Lifecycle::Unmounted;
        }
    }

    /// Commits the finished render: layout effects run now, in slot order;
    /// passive effects are queued for [`HookLedger::flush_effects`].
    /// Returns the number of layout effects run.
    pub fn commit(&mut self) -> Result<usize, HookError> {
        if self.lifecycle != Lifecycle::Committing {
            return Err(HookError::InvalidContext(
                "commit requires a finished render",
            ));
        }
        self.stats.commits += 1;
        for updates in self.slots.iter().filter_map(Slot::updates) {
            updates.commit_staged();
        }

        let (layout, passive): (Vec<_>, Vec<_>) = mem::take(&mut self.staged)
            .into_iter()
            .partition(|effect| effect.kind == EffectKind::Layout);
        self.passive.extend(passive);

        let result = self.run_effects(layout);
        self.lifecycle = Lifecycle::Idle;
        result
    }

    pub fn has_pending_effects(&self) -> bool {
        !self.passive.is_empty()
    }

    /// Runs the committed passive effects in slot order.
    pub fn flush_effects(&mut self) -> Result<usize, HookError> {
        if self.passive.is_empty() {
            return Ok(0);
        }
        let queued: Vec<_> = self.passive.drain(..).collect();
        self.run_effects(queued)
    }

    fn run_effects(&mut self, effects: Vec<PendingEffect>) -> Result<usize, HookError> {
        let mut ran = 0;
        let mut effects = effects.into_iter();
        while let Some(effect) = effects.next() {
            if let Err(err) = self.run_effect(effect) {
                // The rest of this commit is abandoned; clearing their deps
                // makes the next commit run them.
                for rest in effects {
                    self.forget_deps(rest.slot);
                }
                return Err(err);
            }
            ran += 1;
        }
        Ok(ran)
    }

    fn run_effect(&mut self, effect: PendingEffect) -> Result<(), HookError> {
        let PendingEffect {
            slot: index,
            deps,
            run,
            ..
        } = effect;
        let Some(Slot::Effect(slot)) = self.slots.get_mut(index) else {
            return Err(HookError::InvalidContext("queued effect lost its slot"));
        };

        if let Some(cleanup) = slot.cleanup.take() {
            cleanup.run();
            self.stats.cleanups_run += 1;
        }

        log::trace!("running effect in slot {index}");
        match run() {
            Ok(cleanup) => {
                slot.cleanup = cleanup;
                slot.deps = Some(deps);
                slot.runs += 1;
                self.stats.effects_run += 1;
                Ok(())
            }
            Err(source) => {
                slot.deps = None;
                Err(HookError::Effect {
                    slot: index,
                    source,
                })
            }
        }
    }

    fn forget_deps(&mut self, index: usize) {
        if let Some(Slot::Effect(slot)) = self.slots.get_mut(index) {
            slot.deps = None;
        }
    }

    pub fn has_pending_updates(&self) -> bool {
        self.slots
            .iter()
            .filter_map(Slot::updates)
            .any(|u| u.has_pending())
    }

    /// Folds queued state writes and reducer actions, slot by slot, in call
    /// order. The results are what the next render reads; they become the
    /// committed values only when that render commits. Returns whether any
    /// value differs from the committed one; `false` means the pending render
    /// can be skipped.
    ///
    /// When a reducer fails the whole batch is dropped: no slot keeps a staged
    /// value or a queued write.
    pub fn flush_updates(&mut self) -> Result<bool, HookError> {
        if self.disposed {
            return Ok(false);
        }
        let mut changed = false;
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(updates) = slot.updates() else {
                continue;
            };
            match updates.stage() {
                Ok(slot_changed) => changed |= slot_changed,
                Err(source) => {
                    for updates in self.slots.iter().filter_map(Slot::updates) {
                        updates.discard_pending();
                    }
                    return Err(HookError::Reducer {
                        slot: index,
                        source,
                    });
                }
            }
        }
        Ok(changed)
    }

    /// Drops values staged by `flush_updates` for a render that never committed.
    pub(crate) fn discard_staged(&self) {
        for updates in self.slots.iter().filter_map(Slot::updates) {
            updates.discard_staged();
        }
    }

    /// Cancels queued effects and updates, then runs every outstanding cleanup
    /// in slot order. Returns the number of cleanups run.
    pub fn unmount(&mut self) -> Result<usize, HookError> {
        if self.disposed {
            return Err(HookError::InvalidContext("instance already unmounted"));
        }
        self.lifecycle = Lifecycle::Unmounting;
        self.notifier.kill();

        let cancelled = self.staged.len() + self.passive.len();
        self.staged.clear();
        self.passive.clear();
        if cancelled > 0 {
            log::debug!("unmount cancelled {cancelled} queued effects");
        }

        let mut ran = 0;
        for slot in &self.slots {
            match slot {
                Slot::Effect(effect) => {
                    if let Some(cleanup) = &effect.cleanup {
                        cleanup.run();
                        ran += 1;
                    }
                }
                Slot::State(s) | Slot::Reducer(s) => s.updates.discard_pending(),
                Slot::Memo(_) | Slot::Ref(_) => {}
            }
        }
        self.stats.cleanups_run += ran as u64;

        self.slots.clear();
        self.disposed = true;
        self.lifecycle = Lifecycle::Unmounted;
        Ok(ran)
    }
}
