//! Publisher behaviour against a scripted stub broker.
//!
//! Time-dependent tests run on tokio's paused clock, so retry delays and
//! confirmation timeouts elapse instantly but stay measurable.


mod concurrency;
mod publishing;
