pub mod adb_services;
pub mod controller;
pub mod display;
pub mod services;
