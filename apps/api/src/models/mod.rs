pub mod chunk;
pub mod identity;
