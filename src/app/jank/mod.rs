pub mod framestats;
pub mod handwriting;
pub mod harness;
