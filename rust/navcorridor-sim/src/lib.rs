pub mod config;
pub mod planner;
pub mod runner;
pub mod scenario;
