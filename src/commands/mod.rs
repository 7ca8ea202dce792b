pub mod generic;
pub mod rule;
