pub mod nav;
pub mod ncx;
pub mod tree;

pub use nav::{parse_nav, render_nav};
pub use ncx::{parse_ncx, render_ncx};
pub use tree::{Link, Section, TocEntry, TocHeading, TocSection, TocStatistics, TocTree, TocTreeNode, TocTreeStyle};
