pub mod api;
pub mod lab_memory;
