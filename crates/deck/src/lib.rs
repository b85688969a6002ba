//! Template-driven slide deck generation.
//!
//! A report template is an ordinary .pptx deck whose first table slide
//! carries per-group blocks (data rows closed by a statistics row). This
//! crate opens the package, replicates that slide to fit the extracted
//! groups, resizes each block, fills it, and writes the result back out.

pub mod layout;
pub mod package;
pub mod table;
pub mod writer;

pub use package::DeckPackage;
pub use table::{CellStyle, Table, TableCell, TableRow, RED, THEME_COLOR};
pub use writer::{render_report, RenderOptions};
