//! Placement sessions: state, the commit pipeline, and the controller task.
//!
//! A session runs `Idle -> Active -> Committing -> Active | Idle`. Only the
//! controller task in [`controller`] mutates session state; commits run in
//! [`commit`] as detached jobs and report back to it.

pub mod commit;
pub mod controller;
pub mod state;

pub use commit::CommitReport;
pub use controller::{Control, PlacementController, PlacementHandle};
pub use state::{
    Binding, BindingMode, BindingView, HpView, Naming, PendingTransform, Phase, PlacementMode, StartOptions,
    TransformSettings, UiSnapshot,
};
