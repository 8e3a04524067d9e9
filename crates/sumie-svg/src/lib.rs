//! sumie-svg: SVG serialization and markup refinement (sans-IO).
//!
//! Two halves:
//!
//! - [`serialize`]: turn the pipeline's [`PathElement`]s into an SVG
//!   document string ([`to_svg`]).
//! - [`refine::refine`]: shrink that string and remove artifacts through
//!   a fixed sequence of structural passes over a parsed node tree, with
//!   [`tree`] providing the arena the passes operate on.
//!
//! [`PathElement`]: sumie_pipeline::PathElement

pub mod refine;
pub mod serialize;
pub mod tree;

pub use refine::{BorderStyle, RefineOptions, refine, refine_with};
pub use serialize::{SvgMetadata, to_svg};
pub use tree::{RefineError, SvgTree};
