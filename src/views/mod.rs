pub mod slice_viewer;

pub use slice_viewer::slice_viewer;
