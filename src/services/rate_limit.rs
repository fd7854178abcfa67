//! Per-identity request rate limiting.
//!
//! Guards the request-producing commands (connection requests and session
//! requests) against spam. Re-requesting after a rejection stays allowed;
//! it just counts against the same budget.
//!
//! Uses the `governor` crate's token bucket, one bucket per identity.

use crate::error::{CoordError, CoordResult};
use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use tracing::debug;

/// Type alias for governor's direct rate limiter.
type DirectRateLimiter = governor::DefaultDirectRateLimiter;

const MAX_ENTRIES: usize = 10_000;

#[derive(Debug)]
pub struct RequestLimiter {
    limiters: DashMap<String, DirectRateLimiter>,
    per_minute: NonZeroU32,
}

impl RequestLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            limiters: DashMap::new(),
            per_minute: NonZeroU32::new(requests_per_minute).unwrap_or(nonzero!(20u32)),
        }
    }

    /// Consume one token for `identity`, failing with `RateLimited` when
    /// the bucket is empty.
    pub fn check(&self, identity: &str) -> CoordResult<()> {
        let limiter = self
            .limiters
            .entry(identity.to_string())
            .or_insert_with(|| GovRateLimiter::direct(Quota::per_minute(self.per_minute)));

        if limiter.check().is_ok() {
            Ok(())
        } else {
            debug!(identity = %identity, "request rate limit exceeded");
            Err(CoordError::RateLimited)
        }
    }

    /// Drop every bucket once the map grows past a bound.
    pub fn cleanup(&self) {
        if self.limiters.len() > MAX_ENTRIES {
            self.limiters.clear();
            debug!("cleared request rate limiters (exceeded {} entries)", MAX_ENTRIES);
        }
    }
}
