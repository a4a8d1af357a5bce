mod cluster_view;
pub use cluster_view::*;
