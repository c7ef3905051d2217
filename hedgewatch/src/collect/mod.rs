pub mod global_variables;
pub mod inference;
pub mod wayback;
