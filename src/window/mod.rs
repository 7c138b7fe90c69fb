pub mod range;
pub mod time_window;

pub use range::{Range, RangeError};
pub use time_window::{
    FixedWindowSampler, TimeWindow, TimeWindowDownSampler, TimeWindowSampler, ONE_DAY, ONE_HOUR,
    ONE_MINUTE,
};
