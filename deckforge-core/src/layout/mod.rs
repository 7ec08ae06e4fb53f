//! Layout - deterministic placement on a fixed canvas

pub mod engine;
pub mod geometry;
pub mod text;

pub use engine::{place_image, ImagePlacement, LayoutEngine, LayoutError, LayoutOverflow};
pub use geometry::{Canvas, LayoutBox};
pub use text::{fit_text, GlyphMeasurer, TextFit, TextMeasurer, TextRun};
