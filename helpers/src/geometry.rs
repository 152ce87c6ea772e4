use glam::Vec3;

/// Squared segment lengths below this are treated as degenerate.
pub const MIN_SEGMENT_LENGTH_SQ: f32 = 1e-8;

/// segment_fraction projects `p` onto the line through `a` and `b` and returns the unclamped
/// parameter t = dot(p - a, b - a) / dot(b - a, b - a). Returns `None` for a zero-length segment.
pub fn segment_fraction(p: Vec3, a: Vec3, b: Vec3) -> Option<f32> {
    let ab = b - a;
    let denom = ab.dot(ab);
    if denom <= MIN_SEGMENT_LENGTH_SQ || !denom.is_finite() {
        return None;
    }
    let t = (p - a).dot(ab) / denom;
    if t.is_finite() {
        Some(t)
    } else {
        None
    }
}
