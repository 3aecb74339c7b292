mod tracked;

pub use tracked::{TrackedEntityLoader, TrackedEntityLoaderConfig};
