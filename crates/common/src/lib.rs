pub mod error;
pub mod time;

pub use error::{Error, ErrorKind, Result};
pub use time::{Clock, ManualClock, SystemClock, unix_now};
