pub mod console;
pub mod generic;
pub mod report;
pub mod rule;
pub mod script;
pub mod serialize;
