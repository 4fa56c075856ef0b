//! # Hooks, Effects, and the Ledger
//!
//! Tether gives plain functions ("components") persistent state. Each mounted
//! instance owns a [`HookLedger`]: an ordered list of slots, one per hook call,
//! matched by position on every render. There are a few pieces:
//!
//! - [`Hooks`]: the render context a component receives; every `use_*` call
//!   claims the next slot.
//! - [`Runtime`]: schedules renders. It mounts instances, re-renders them when their
//!   state changes, commits output and flushes effects.
//! - [`Deps`] / [`deps!`]: dependency lists gating effects and memos.
//! - [`Context`]: values provided runtime-wide and read with `use_context`.
//!
//! ## State
//!
//! ```rust
//! use tether_core::*;
//!
//! let mut rt: Runtime<(), String> = Runtime::new();
//! let id = rt
//!     .mount("counter", (), |hooks, _| {
//!         let (count, set_count) = hooks.use_state(|| 0)?;
//!         let _ = set_count; // handed to a click handler in a real app
//!         Ok(format!("You clicked {count} times"))
//!     })
//!     .unwrap();
//! assert_eq!(rt.output(id).unwrap(), "You clicked 0 times");
//! ```
//!
//! - The `init` closure of `use_state` runs on the first render only.
//! - `SetState::set` and `SetState::update` queue writes; they are applied in
//!   call order right before the next render. When the result equals the
//!   current value the render is skipped entirely.
//!
//! ## Effects and cleanup
//!
//! ```rust
//! use tether_core::*;
//!
//! let mut rt: Runtime<u32, ()> = Runtime::new();
//! let id = rt
//!     .mount("friend-status", 100, |hooks, friend_id| {
//!         let friend_id = *friend_id;
//!         hooks.use_effect(deps![friend_id], move || {
//!             log::info!("subscribe {friend_id}");
//!             cleanup(move || log::info!("unsubscribe {friend_id}"))
//!         })?;
//!         Ok(())
//!     })
//!     .unwrap();
//! rt.run_until_idle().unwrap(); // subscribe 100
//! rt.set_props(id, 200).unwrap();
//! rt.run_until_idle().unwrap(); // unsubscribe 100, subscribe 200
//! rt.unmount(id).unwrap(); // unsubscribe 200
//! ```
//!
//! - `Deps::Always` runs after every commit, `deps![]` once, `deps![a, b]`
//!   whenever `a` or `b` changes.
//! - The previous cleanup always runs before the next invocation, and the last
//!   one runs at unmount.
//! - `use_layout_effect` runs inside the commit itself, before passive effects.
//!
//! ## Rules
//!
//! Hooks must be called unconditionally and in the same order on every render.
//! Skipping one on some renders is reported as a "hook order violated"
//! [`HookError`] rather than silently shifting the slots that follow. Put the
//! condition inside the effect instead.

pub mod context;
pub mod deps;
pub mod effects;
pub mod error;
pub mod hooks;
pub mod ledger;
pub mod prelude;
pub mod runtime;
pub mod slot;
pub mod state;


pub use prelude::*;
