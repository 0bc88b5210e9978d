//! # Runtime Module
//!
//! Process bootstrap and error handling policies for the controller.

pub mod error_policy;
pub mod initialization;

pub use error_policy::*;
pub use initialization::*;
