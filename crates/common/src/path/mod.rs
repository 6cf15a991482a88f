pub mod normalize;

pub use normalize::{normalize_path, relative_slash_path, PathError};
