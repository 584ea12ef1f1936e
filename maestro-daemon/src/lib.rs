//! Library half of the Maestro daemon package — split out from `main.rs`
//! (fae/saorsa-labs' `bin` + `lib` same-package shape) purely so the HTTP
//! control surface can be exercised by `tests/` without spawning a process.

pub mod config;
pub mod error;
pub mod http;
