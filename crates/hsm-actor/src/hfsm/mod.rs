//! Hierarchical finite state machines.
//!
//! States form a forest: each state optionally names a parent, and the
//! machine always occupies exactly one node (internal nodes included).
//! Transitions come in two flavors: trigger-driven edges taken by
//! [`Machine::fire`], matched from the current state up the parent chain,
//! and condition-driven edges taken by [`Machine::update`], which scans the
//! current state's guards and chains transitions until no guard holds.
//!
//! Crossing a hierarchy boundary runs exit hooks from the current leaf up
//! to (but excluding) the least common ancestor with the target, then the
//! transition's setup callback, then enter hooks from below the common
//! ancestor down to the target.
//!
//! ```
//! use hsm_actor::hfsm::{MachineSpec, StateSpec};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Mode { Idle, Active, Homing, Tracking }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Event { Engage, Locked }
//!
//! struct Rig { target_seen: bool }
//!
//! let mut machine = MachineSpec::new(Mode::Idle)
//!     .state(StateSpec::new(Mode::Idle).when(Event::Engage, Mode::Homing))
//!     .state(StateSpec::new(Mode::Active))
//!     .state(
//!         StateSpec::new(Mode::Homing)
//!             .parent(Mode::Active)
//!             .when(Event::Locked, Mode::Tracking)
//!             .auto(Mode::Tracking, |rig: &Rig| rig.target_seen),
//!     )
//!     .state(StateSpec::new(Mode::Tracking).parent(Mode::Active))
//!     .build()
//!     .unwrap();
//!
//! let mut rig = Rig { target_seen: false };
//! machine.fire(Event::Engage, &mut rig);
//! assert!(machine.in_state(Mode::Active));
//! assert_eq!(machine.current(), Mode::Homing);
//! ```

pub mod machine;
pub mod types;

pub use machine::{CursorSinkFn, ErrorSinkFn, Machine, ObserverFn, UnhandledSinkFn};
pub use types::{
    GuardFn, HookFn, MachineSpec, SetupFn, StateChange, StateKey, StateSpec, TransitionSpec,
    TriggerKey,
};
