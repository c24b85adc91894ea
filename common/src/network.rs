pub mod domain;
pub mod range;
pub mod target;
