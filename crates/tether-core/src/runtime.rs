use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bitflags::bitflags;
use slotmap::{SlotMap, new_key_type};
use web_time::Instant;

use crate::context::{Context, ContextRegistry};
use crate::error::HookError;
use crate::hooks::Hooks;
use crate::ledger::{HookLedger, Lifecycle};

new_key_type! {
    /// Identity of one mounted component instance.
    pub struct InstanceId;
}

/// Instances notified by a setter or dispatch since the last render pass.
#[derive(Default)]
pub(crate) struct Mailbox {
    dirty: RefCell<Vec<InstanceId>>,
}

impl Mailbox {
    pub fn notify(&self, id: InstanceId) {
        let mut dirty = self.dirty.borrow_mut();
        if !dirty.contains(&id) {
            dirty.push(id);
        }
    }

    fn take(&self) -> Vec<InstanceId> {
        std::mem::take(&mut *self.dirty.borrow_mut())
    }

    fn is_empty(&self) -> bool {
        self.dirty.borrow().is_empty()
    }

    fn peek(&self) -> Option<InstanceId> {
        self.dirty.borrow().first().copied()
    }

    fn forget(&self, id: InstanceId) {
        self.dirty.borrow_mut().retain(|d| *d != id);
    }
}

bitflags! {
    /// Reasons to render an instance even when no state changed.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InstanceFlags: u8 {
        const PROPS_CHANGED = 1 << 0;
        const CONTEXT_CHANGED = 1 << 1;
        const INVALIDATED = 1 << 2;
        const FORCED = Self::PROPS_CHANGED.bits() | Self::CONTEXT_CHANGED.bits() | Self::INVALIDATED.bits();
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Upper bound on render passes a single `run_until_idle` may take.
    pub max_render_passes: usize,
    /// When false, `use_memo`/`use_callback` recompute on every render.
    pub memoize: bool,
    /// When true, a dependency list that changes length fails the render
    /// instead of logging a warning.
    pub strict_deps: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_render_passes: 25,
            memoize: true,
            strict_deps: false,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_render_passes(mut self, passes: usize) -> Self {
        self.max_render_passes = passes;
        self
    }

    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    pub fn with_strict_deps(mut self, strict: bool) -> Self {
        self.strict_deps = strict;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InstanceStats {
    pub renders: u64,
    /// Render requests skipped because every queued update left state unchanged.
    pub bailouts: u64,
    pub commits: u64,
    pub effects_run: u64,
    pub cleanups_run: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub last_render: Duration,
}

pub type RenderFn<P, O> = Box<dyn FnMut(&mut Hooks<'_>, &P) -> Result<O, HookError>>;

struct Instance<P, O> {
    name: String,
    props: P,
    render: RenderFn<P, O>,
    ledger: HookLedger,
    output: Option<O>,
    flags: InstanceFlags,
    bailouts: u64,
    last_render: Duration,
}

/// Render scheduler.
///
/// Owns the mounted instances, decides when each one renders, commits their
/// output and flushes their effects. `P` is the props type handed to every
/// render, `O` the output type a render produces.
///
/// ```rust
/// use tether_core::*;
///
/// let mut rt: Runtime<(), String> = Runtime::new();
/// let id = rt
///     .mount("counter", (), |hooks, _| {
///         let (count, set_count) = hooks.use_state(|| 0)?;
///         hooks.use_effect(deps![], move || set_count.update(|c| c + 1))?;
///         Ok(format!("count = {count}"))
///     })
///     .unwrap();
/// assert_eq!(rt.output(id).unwrap(), "count = 0");
///
/// rt.run_until_idle().unwrap();
/// assert_eq!(rt.output(id).unwrap(), "count = 1");
/// ```
pub struct Runtime<P = (), O = ()> {
    config: RuntimeConfig,
    instances: SlotMap<InstanceId, Instance<P, O>>,
    contexts: ContextRegistry,
    mailbox: Rc<Mailbox>,
}

impl<P: 'static, O: 'static> Default for Runtime<P, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static, O: 'static> Runtime<P, O> {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            instances: SlotMap::with_key(),
            contexts: ContextRegistry::default(),
            mailbox: Rc::new(Mailbox::default()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Mounts an instance: runs its first render and commits it. Layout effects
    /// run before this returns; passive effects wait for
    /// [`Runtime::flush_effects`]. A failed mount leaves nothing behind.
    pub fn mount<F>(
        &mut self,
        name: impl Into<String>,
        props: P,
        render: F,
    ) -> Result<InstanceId, HookError>
    where
        F: FnMut(&mut Hooks<'_>, &P) -> Result<O, HookError> + 'static,
    {
        let name = name.into();
        let config = &self.config;
        let mailbox = &self.mailbox;
        let id = self.instances.insert_with_key(|id| {
            let ledger = HookLedger::with_config(config);
            ledger.bind(id, mailbox);
            Instance {
                name,
                props,
                render: Box::new(render),
                ledger,
                output: None,
                flags: InstanceFlags::empty(),
                bailouts: 0,
                last_render: Duration::ZERO,
            }
        });

        if let Err(err) = self.render_instance(id, true) {
            if let Some(mut instance) = self.instances.remove(id) {
                if instance.ledger.is_mounted()
                    && let Err(cleanup_err) = instance.ledger.unmount()
                {
                    log::debug!("unmount after failed mount of `{}`: {cleanup_err}", instance.name);
                }
                log::debug!("mount of `{}` failed: {err}", instance.name);
            }
            self.mailbox.forget(id);
            return Err(err);
        }
        log::debug!("mounted `{}`", self.instances[id].name);
        Ok(id)
    }

    /// Runs the instance's queued passive effects, applies its queued updates
    /// and renders it unless nothing changed and nothing forces a render.
    /// Returns whether a render happened.
    fn render_instance(&mut self, id: InstanceId, force: bool) -> Result<bool, HookError> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or(HookError::UnknownInstance(id))?;

        instance.ledger.flush_effects()?;
        let updated = instance.ledger.flush_updates()?;
        let forced = force || instance.flags.intersects(InstanceFlags::FORCED);
        instance.flags.remove(InstanceFlags::FORCED);
        if !updated && !forced {
            instance.bailouts += 1;
            log::trace!("`{}`: state unchanged, render skipped", instance.name);
            return Ok(false);
        }

        let started = Instant::now();
        let output = {
            let mut hooks = instance.ledger.begin_render(&self.contexts)?;
            let output = (instance.render)(&mut hooks, &instance.props)?;
            hooks.finish()?;
            output
        };
        instance.last_render = started.elapsed();
        instance.output = Some(output);
        log::trace!("`{}` rendered in {:?}", instance.name, instance.last_render);

        instance.ledger.commit()?;
        Ok(true)
    }

    /// Renders every instance that has been notified since the last pass.
    /// Returns the number of renders performed.
    pub fn render_pending(&mut self) -> Result<usize, HookError> {
        let dirty = self.mailbox.take();
        let mut rendered = 0;
        for (i, id) in dirty.iter().enumerate() {
            if !self.instances.contains_key(*id) {
                continue;
            }
            match self.render_instance(*id, false) {
                Ok(true) => rendered += 1,
                Ok(false) => {}
                Err(err) => {
                    for rest in &dirty[i + 1..] {
                        self.mailbox.notify(*rest);
                    }
                    return Err(err);
                }
            }
        }
        if rendered > 0 {
            log::debug!("render pass: {rendered} of {} instances rendered", dirty.len());
        }
        Ok(rendered)
    }

    /// Runs every committed passive effect, per instance in slot order.
    pub fn flush_effects(&mut self) -> Result<usize, HookError> {
        let mut ran = 0;
        for (_, instance) in self.instances.iter_mut() {
            ran += instance.ledger.flush_effects()?;
        }
        Ok(ran)
    }

    /// Alternates effect flushing and render passes until no instance has
    /// pending work. Returns the number of render passes taken.
    pub fn run_until_idle(&mut self) -> Result<usize, HookError> {
        let mut passes = 0;
        loop {
            self.flush_effects()?;
            if self.mailbox.is_empty() {
                return Ok(passes);
            }
            if passes == self.config.max_render_passes {
                let name = self
                    .mailbox
                    .peek()
                    .and_then(|id| self.instances.get(id))
                    .map(|instance| instance.name.clone())
                    .unwrap_or_default();
                self.mailbox.take();
                return Err(HookError::TooManyRenders {
                    name,
                    limit: self.config.max_render_passes,
                });
            }
            passes += 1;
            self.render_pending()?;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.mailbox.is_empty()
            && self
                .instances
                .values()
                .all(|instance| !instance.ledger.has_pending_effects())
    }

    /// Replaces the instance's props and schedules a render.
    pub fn set_props(&mut self, id: InstanceId, props: P) -> Result<(), HookError> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or(HookError::UnknownInstance(id))?;
        instance.props = props;
        instance.flags.insert(InstanceFlags::PROPS_CHANGED);
        self.mailbox.notify(id);
        Ok(())
    }

    /// Schedules a render of the instance regardless of its state.
    pub fn invalidate(&mut self, id: InstanceId) -> Result<(), HookError> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or(HookError::UnknownInstance(id))?;
        instance.flags.insert(InstanceFlags::INVALIDATED);
        self.mailbox.notify(id);
        Ok(())
    }

    /// Provides a context value to every instance. Instances that read the
    /// context during their last render are scheduled when the value changes.
    /// Returns the number of instances scheduled.
    pub fn provide<T: PartialEq + 'static>(&mut self, ctx: &Context<T>, value: T) -> usize {
        if !self.contexts.provide(ctx, value) {
            return 0;
        }
        self.invalidate_readers(ctx)
    }

    /// Removes a provided value; readers fall back to the context default.
    pub fn revoke<T: PartialEq + 'static>(&mut self, ctx: &Context<T>) -> usize {
        if !self.contexts.revoke(ctx) {
            return 0;
        }
        self.invalidate_readers(ctx)
    }

    fn invalidate_readers<T>(&mut self, ctx: &Context<T>) -> usize {
        let mut scheduled = 0;
        for (id, instance) in self.instances.iter_mut() {
            if instance.ledger.reads_context(ctx.id()) {
                instance.flags.insert(InstanceFlags::CONTEXT_CHANGED);
                self.mailbox.notify(id);
                scheduled += 1;
            }
        }
        scheduled
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    /// Unmounts the instance: cancels its queued effects and updates and runs
    /// its cleanups in slot order. Returns the number of cleanups run.
    pub fn unmount(&mut self, id: InstanceId) -> Result<usize, HookError> {
        let mut instance = self
            .instances
            .remove(id)
            .ok_or(HookError::UnknownInstance(id))?;
        self.mailbox.forget(id);
        let cleanups = instance.ledger.unmount()?;
        log::debug!("unmounted `{}` ({cleanups} cleanups)", instance.name);
        Ok(cleanups)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.keys()
    }

    pub fn name(&self, id: InstanceId) -> Option<&str> {
        self.instances.get(id).map(|i| i.name.as_str())
    }

    pub fn props(&self, id: InstanceId) -> Option<&P> {
        self.instances.get(id).map(|i| &i.props)
    }

    /// Output of the last committed render.
    pub fn output(&self, id: InstanceId) -> Option<&O> {
        self.instances.get(id).and_then(|i| i.output.as_ref())
    }

    pub fn ledger(&self, id: InstanceId) -> Option<&HookLedger> {
        self.instances.get(id).map(|i| &i.ledger)
    }

    pub fn lifecycle(&self, id: InstanceId) -> Option<Lifecycle> {
        self.instances.get(id).map(|i| i.ledger.lifecycle())
    }

    pub fn stats(&self, id: InstanceId) -> Option<InstanceStats> {
        self.instances.get(id).map(|instance| {
            let ledger = instance.ledger.stats();
            InstanceStats {
                renders: ledger.renders,
                bailouts: instance.bailouts,
                commits: ledger.commits,
                effects_run: ledger.effects_run,
                cleanups_run: ledger.cleanups_run,
                last_render: instance.last_render,
            }
        })
    }
}
