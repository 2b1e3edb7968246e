//! Category rules: the persisted store and the reconciler that grows it.

pub mod reconciler;
pub mod store;

pub use reconciler::{Reconciliation, RuleReconciler};
pub use store::{Rule, RuleStore, capitalize};
