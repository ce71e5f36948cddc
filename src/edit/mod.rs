//! Sphere brush edits: clipping, per-chunk dispatch and deferred commands.

pub mod brush;
pub mod command;
pub mod editor;
pub mod region;

pub use brush::{BrushDispatch, BrushKind};
pub use command::{EditCommand, EditQueue};
pub use editor::{EditReport, TerrainEditor};
pub use region::EditRegion;
