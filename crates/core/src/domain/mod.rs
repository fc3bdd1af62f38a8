pub mod action;
pub mod capability;
pub mod invocation;
