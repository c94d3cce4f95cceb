//! Error alias and context helpers for config loading.

pub use vigil_common::{Error, Result};

vigil_common::impl_context!();
