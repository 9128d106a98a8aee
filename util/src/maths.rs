//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Return the euclidian norm (distance between) of two points.
///
/// If the points do not have the same number of dimentions then `None` is 
/// returned.
pub fn norm<T>(point_0: &[T], point_1: &[T]) -> Option<T> 
where
    T: Float + std::ops::AddAssign
{
    if point_0.len() != point_1.len() {
        return None;
    }

    let mut sum = T::zero();

    for (a, b) in point_0.iter().zip(point_1.iter()) {
        sum += (*a - *b).powi(2);
    }

    Some(sum.sqrt())
}

/// Return `+magnitude` if `value` is strictly positive, otherwise `-magnitude`.
///
/// Unlike `signum` a zero value maps to the negative direction.
pub fn signed_by<T>(value: T, magnitude: T) -> T
where
    T: Float
{
    if value > T::zero() {
        magnitude
    }
    else {
        -magnitude
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_norm() {
        assert_eq!(norm(&[0f64, 0f64], &[3f64, 4f64]), Some(5f64));
        assert_eq!(norm(&[1f64], &[1f64, 2f64]), None);

        let d = norm(&[0.1f64, 0.1f64], &[4.75f64, 4.75f64]).unwrap();
        assert!((d - 6.576093).abs() < 1e-6);
    }

    #[test]
    fn test_signed_by() {
        assert_eq!(signed_by(0.3f64, 500f64), 500f64);
        assert_eq!(signed_by(-0.3f64, 500f64), -500f64);
        assert_eq!(signed_by(0f64, 500f64), -500f64);
    }
}
