//! Default worker limit.
//!
//! Every pipeline task may hold a few descriptors open (the input file, a
//! linked file, a schema connection), so on Unix the limit follows the soft
//! `RLIMIT_NOFILE`. Elsewhere it follows the CPU count.

/// Used when no OS-derived value is available.
pub const FALLBACK_CONCURRENCY: usize = 10;

/// Upper bound for any derived default.
pub const MAX_DEFAULT_CONCURRENCY: usize = 1024;

/// `floor(limit * 3 / 4)` clamped to `[1, MAX_DEFAULT_CONCURRENCY]`.
pub fn from_descriptor_limit(soft_limit: u64) -> usize {
    let scaled = soft_limit.saturating_mul(3) / 4;
    usize::try_from(scaled)
        .unwrap_or(MAX_DEFAULT_CONCURRENCY)
        .clamp(1, MAX_DEFAULT_CONCURRENCY)
}

#[cfg(unix)]
pub fn default_concurrency() -> usize {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 {
        return FALLBACK_CONCURRENCY;
    }
    if limit.rlim_cur == libc::RLIM_INFINITY {
        return MAX_DEFAULT_CONCURRENCY;
    }
    #[allow(clippy::useless_conversion)]
    from_descriptor_limit(u64::from(limit.rlim_cur))
}

#[cfg(windows)]
pub fn default_concurrency() -> usize {
    num_cpus::get().saturating_mul(4).clamp(1, MAX_DEFAULT_CONCURRENCY)
}

#[cfg(not(any(unix, windows)))]
pub fn default_concurrency() -> usize {
    FALLBACK_CONCURRENCY
}
