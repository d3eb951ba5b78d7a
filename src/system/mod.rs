//! OS access: process execution, registry, adapters and privileges.

pub mod adapters;
pub mod command;
pub mod powershell;
pub mod privileges;
pub mod registry;

pub use adapters::{detect_adapters, list_subinterfaces, Adapter, SubInterface};
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use privileges::is_elevated;
pub use registry::{RegValue, Registry};
