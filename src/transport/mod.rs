/// Filesystem-backed resolvers.
pub mod fs;
