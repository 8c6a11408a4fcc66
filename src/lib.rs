//! Per-site time tracking for a browser. A browser host reports tab and window events, the
//! tracker turns them into time spent on every domain and keeps the totals on disk.
//!

pub mod browser_api;
pub mod cli;
pub mod daemon;
pub mod fs;
pub mod utils;
