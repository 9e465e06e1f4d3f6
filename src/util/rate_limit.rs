//! Rate limiting for inbound protocol lines

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default number of lines a connection may send per second
pub const LINE_RATE_LIMIT: u32 = 10;

/// Create a rate limiter with the specified lines per second
pub fn create_limiter(per_second: u32) -> Limiter {
    let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
    RateLimiter::direct(quota)
}

/// Per-connection line limiter, owned by the connection handler
pub struct LineRateLimiter {
    limiter: Limiter,
}

impl LineRateLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            limiter: create_limiter(per_second),
        }
    }

    /// Check if another line is allowed (returns true if allowed)
    pub fn check_line(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for LineRateLimiter {
    fn default() -> Self {
        Self::new(LINE_RATE_LIMIT)
    }
}
