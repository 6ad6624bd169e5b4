#![forbid(unsafe_code)]

pub mod error;
pub mod grader;
pub mod leitner;
pub mod model;
pub mod prerequisite;
pub mod time;

pub use error::Error;
pub use time::Clock;
