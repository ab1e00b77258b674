/// Hard ceiling on entries requested from one source per fetch.
pub const MAX_PER_SOURCE_QUOTA: usize = 50;

/// Clamp a caller-supplied result cap to `[0, max_results]`.
///
/// Zero and negative requests map to 0, which means "fetch nothing".
pub fn clamp_result_cap(requested: i64, max_results: usize) -> usize {
    if requested <= 0 {
        return 0;
    }
    usize::try_from(requested)
        .unwrap_or(usize::MAX)
        .min(max_results)
}

/// Per-source fetch limit: `max(1, min(50, floor(cap / sources) + 1))`.
///
/// The `+ 1` over-asks slightly so that filtered-out posts do not leave the
/// batch short when every source contributes evenly. A source count of 0 is
/// treated as 1.
pub fn per_source_quota(result_cap: usize, source_count: usize) -> usize {
    let sources = source_count.max(1);
    (result_cap / sources)
        .saturating_add(1)
        .min(MAX_PER_SOURCE_QUOTA)
        .max(1)
}
