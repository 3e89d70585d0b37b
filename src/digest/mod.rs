pub mod audit;
pub mod collector;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod format;
pub mod identity;
pub mod parse;
pub mod paths;
pub mod pipeline;
pub mod platform;
pub mod prompt;
pub mod scheduler;
pub mod state;
pub mod threads;
pub mod types;
pub mod util;
pub mod warn;

#[cfg(test)]
pub mod testing;
