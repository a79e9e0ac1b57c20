//! Stochastic Grammar — compact rule tables expanded into random sequences.
//!
//! Rules are declared as short strings using four operators (fallback,
//! sequence, weighted selection and repetition), may reference each other
//! recursively, and expand into an ordered sequence of caller-supplied
//! terminal values.

pub mod core;
pub mod schema;
