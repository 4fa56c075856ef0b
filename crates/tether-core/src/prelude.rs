pub use crate::context::{Context, ContextId, ContextRegistry, create_context};
pub use crate::deps;
pub use crate::deps::{Dep, DepList, DepValue, Deps};
pub use crate::effects::{Cleanup, EffectKind, EffectOutput, cleanup};
pub use crate::error::{BoxError, HookError};
pub use crate::hooks::Hooks;
pub use crate::ledger::{HookLedger, LedgerStats, Lifecycle};
pub use crate::runtime::{
    InstanceFlags, InstanceId, InstanceStats, RenderFn, Runtime, RuntimeConfig,
};
pub use crate::slot::{SlotInfo, SlotKind};
pub use crate::state::{Dispatch, Ref, SetState};
