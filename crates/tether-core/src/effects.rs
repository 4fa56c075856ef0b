use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::deps::Deps;
use crate::error::BoxError;

/// Cleanup returned by an effect; run before the effect's next invocation or at unmount.
#[derive(Clone)]
pub struct Cleanup(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn has_run(&self) -> bool {
        self.0.borrow().is_none()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("pending", &!self.has_run())
            .finish()
    }
}

/// Helper to return a cleanup from an effect.
pub fn cleanup(f: impl FnOnce() + 'static) -> Cleanup {
    Cleanup::new(f)
}

/// What an effect callback may return.
pub trait EffectOutput {
    fn into_outcome(self) -> Result<Option<Cleanup>, BoxError>;
}

impl EffectOutput for () {
    fn into_outcome(self) -> Result<Option<Cleanup>, BoxError> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_outcome(self) -> Result<Option<Cleanup>, BoxError> {
        Ok(Some(self))
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_outcome(self) -> Result<Option<Cleanup>, BoxError> {
        Ok(self)
    }
}

impl<T, E> EffectOutput for Result<T, E>
where
    T: EffectOutput,
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<Option<Cleanup>, BoxError> {
        self.map_err(Into::<BoxError>::into)?.into_outcome()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EffectKind {
    /// Runs after the commit, when the scheduler flushes effects.
    Passive,
    /// Runs synchronously inside the commit step, before passive effects.
    Layout,
}

/// An effect whose deps changed during a render, waiting for its commit.
pub(crate) struct PendingEffect {
    pub slot: usize,
    pub kind: EffectKind,
    pub deps: Deps,
    pub run: Box<dyn FnOnce() -> Result<Option<Cleanup>, BoxError>>,
}

impl PendingEffect {
    pub fn new<F, R>(slot: usize, kind: EffectKind, deps: Deps, callback: F) -> Self
    where
        F: FnOnce() -> R + 'static,
        R: EffectOutput,
    {
        Self {
            slot,
            kind,
            deps,
            run: Box::new(move || callback().into_outcome()),
        }
    }
}

impl fmt::Debug for PendingEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEffect")
            .field("slot", &self.slot)
            .field("kind", &self.kind)
            .field("deps", &self.deps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_cleanup_runs_once() {
        let count = Rc::new(Cell::new(0));
        let c = {
            let count = count.clone();
            cleanup(move || count.set(count.get() + 1))
        };
        let c2 = c.clone();
        c.run();
        c2.run();
        assert_eq!(count.get(), 1);
        assert!(c.has_run());
    }

    #[test]
    fn test_effect_outputs() {
        assert!(().into_outcome().unwrap().is_none());
        assert!(cleanup(|| {}).into_outcome().unwrap().is_some());
        assert!(None::<Cleanup>.into_outcome().unwrap().is_none());

        let ok: Result<Cleanup, String> = Ok(cleanup(|| {}));
        assert!(ok.into_outcome().unwrap().is_some());

        let err: Result<(), String> = Err("subscription refused".into());
        let err = err.into_outcome().unwrap_err();
        assert_eq!(err.to_string(), "subscription refused");
    }
}
