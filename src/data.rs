pub mod domain;
pub mod metadata;
pub mod source;
