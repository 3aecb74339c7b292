mod container;
mod field;

pub(crate) use container::{resolve_container, resolve_root_container, resolve_root_container_serial};
