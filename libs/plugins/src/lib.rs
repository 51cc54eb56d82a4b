//! Loom Plugins - the Action/Trigger contract and the in-memory registry
//! that plugins are loaded into (spec.md §4.C, §6).

pub mod registry;
pub mod traits;

pub use registry::{split_qualified, PluginRegistry, RegistryError};
pub use traits::{
    Action, ActionContext, ActionError, EmitFn, Plugin, TeardownFn, Trigger, TriggerSetupError,
};
