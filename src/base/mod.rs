//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): Network error codes matching `net_error_list.h`
//! - [`ConnectState`](connectstate::ConnectState): Lifecycle states of a connect job
//! - [`IoResultExt`](context::IoResultExt): Context helpers for IO errors

pub mod connectstate;
pub mod context;
pub mod neterror;
