//! The `utils` module holds the pieces shared across `fanout`: the error type
//! and the logging setup.

pub mod error;
pub mod logging;
