//! URI template matching engine.
//!
//! Templates are parsed and compiled once per configuration generation, then
//! evaluated concurrently and without locks on every request:
//!
//! ```text
//! "/v1/{name=shelves/*}:get"
//!     → Template::parse      (segments + verb, syntax checks)
//!     → PathMatcher::compile (exact literal, or anchored expression + field paths)
//!     → PathMatcher::matches (per request: Option<Bindings>)
//!     → select_most_specific (tie-break across co-matching templates)
//! ```
pub mod matcher;
pub mod specificity;
pub mod template;

pub use matcher::{Bindings, PathMatcher, wildcard_pattern_for};
pub use specificity::{Specificity, select_most_specific};
pub use template::{FieldPath, ParseError, Segment, Template, Variable};
