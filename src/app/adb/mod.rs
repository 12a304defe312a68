pub mod bridge;
pub mod locator;
pub mod monkey;
pub mod parse;
pub mod runner;
