//! Cross-unit composition: turns keyed fragments and the node graph into
//! absolute endpoints.

pub mod paths;
pub mod resolver;

pub use paths::{join_segments, normalize_pattern, to_absolute};
pub use resolver::{compose, Composition};
