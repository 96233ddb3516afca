//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): error codes for the bridge, in the
//!   Chromium `net_error_list.h` numbering style
//! - [`IoResultExt`](context::IoResultExt): IO error to `NetError` mapping

pub mod context;
pub mod neterror;

#[cfg(test)]
mod tests;
