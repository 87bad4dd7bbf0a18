//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
///
/// This does not clip out of range values. To invert a mapping swap the
/// bounds of the target range.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Restrict a value to the range `[min, max]`.
pub fn clip<T>(value: T, min: T, max: T) -> T 
where
    T: Float
{
    value.max(min).min(max)
}

/// Squared euclidian distance between two points in the XY plane.
pub fn planar_dist_sq<T>(a: &[T; 2], b: &[T; 2]) -> T
where
    T: Float
{
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Wrap an angle into a single revolution centred on zero.
///
/// Output lies in `[-pi, pi)`, so an odd multiple of pi wraps to `-pi`.
pub fn normalize_angle<T>(angle: T) -> T
where
    T: Float
{
    let pi_t = T::from(std::f64::consts::PI).unwrap_or_else(T::zero);
    let tau_t = pi_t + pi_t;

    // rem_euclid can round up to tau for inputs just below -pi
    let r = rem_euclid(angle + pi_t, tau_t);
    let r = if r >= tau_t { T::zero() } else { r };

    r - pi_t
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}
