pub mod lab;
pub mod template;
