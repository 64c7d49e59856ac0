//! Rate limiting logic and state management.

mod info;
mod limiter;
mod max;
mod memory;
mod store;

pub use info::{RateLimitInfo, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER};
pub use limiter::RateLimiter;
pub use max::{Max, ResolveMax, DEFAULT_MAX};
pub use memory::MemoryStore;
pub(crate) use memory::check_interval;
pub use store::{Hit, Store};
