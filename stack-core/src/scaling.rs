//! Target-tracking arithmetic for request-count scaling.

use stack_types::ScalingRule;

/// Pool size that brings per-instance load to the rule's target.
///
/// `ceil(requests_per_minute / target)` clamped to `[min, max]`.
pub fn desired_capacity(rule: &ScalingRule, requests_per_minute: u64, min: u32, max: u32) -> u32 {
    if rule.target_requests_per_minute == 0 {
        return max;
    }
    let target = u64::from(rule.target_requests_per_minute);
    let wanted = requests_per_minute.div_ceil(target);
    let wanted = u32::try_from(wanted).unwrap_or(u32::MAX);
    wanted.clamp(min, max.max(min))
}

/// Desired size across several rules: the largest any rule asks for.
pub fn desired_capacity_for(
    rules: &[ScalingRule],
    requests_per_minute: u64,
    min: u32,
    max: u32,
) -> Option<u32> {
    rules
        .iter()
        .map(|r| desired_capacity(r, requests_per_minute, min, max))
        .max()
}
