pub mod device;
pub mod locator;
pub mod runner;
