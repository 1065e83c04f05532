//! Training-program calendar scheduling: parse a free-form program into
//! sessions, place each session on a date, partition the candidates against
//! busy calendar periods, and write the conflict-free ones out through a
//! pluggable calendar provider.

pub mod error;
pub mod models;
pub mod services;
pub mod utils;
