//! Lexical front end: line classification, statement reconstruction, and
//! argument decoding shared by every idiom interpreter.

pub mod classifier;
pub mod expr;
pub mod statements;

pub use classifier::{classify, ClassifiedLine, ClassifiedUnit, LineTag, Segment, SegmentKind};
pub use expr::{Arg, Args, Expr};
pub use statements::{reconstruct, LogicalStatement};
