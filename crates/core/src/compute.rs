//! Streaming sum of squares
//!
//! The accumulator is a signed 32-bit integer with wrapping arithmetic, so a
//! vector whose true sum exceeds `i32::MAX` yields the wrapped value.

/// Running sum of squares for one vector
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SquareSum(i32);

impl SquareSum {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn push(&mut self, element: i32) {
        self.0 = self.0.wrapping_add(element.wrapping_mul(element));
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl Extend<i32> for SquareSum {
    fn extend<I: IntoIterator<Item = i32>>(&mut self, iter: I) {
        for element in iter {
            self.push(element);
        }
    }
}

impl FromIterator<i32> for SquareSum {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        let mut sum = Self::new();
        sum.extend(iter);
        sum
    }
}

/// Sum of squares of a whole vector
pub fn sum_of_squares(elements: &[i32]) -> i32 {
    elements.iter().copied().collect::<SquareSum>().value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_vector() {
        assert_eq!(sum_of_squares(&[1, 2, 3]), 14);
        assert_eq!(sum_of_squares(&[-4, 0, 4]), 32);
    }

    #[test]
    fn test_empty_vector_is_zero() {
        assert_eq!(sum_of_squares(&[]), 0);
        assert_eq!(SquareSum::new().value(), 0);
    }

    #[test]
    fn test_wraps_on_overflow() {
        // 46341^2 = 2_147_488_281 > i32::MAX
        assert_eq!(sum_of_squares(&[46341]), 2_147_488_281u32 as i32);
        assert_eq!(sum_of_squares(&[i32::MIN]), 0);
        assert_eq!(
            sum_of_squares(&[46340, 46340]),
            (2u64 * 46340 * 46340) as u32 as i32
        );
    }

    #[test]
    fn test_incremental_matches_batch() {
        let elements = [7, -3, 100_000, 12];
        let mut sum = SquareSum::new();
        for e in elements {
            sum.push(e);
        }
        assert_eq!(sum.value(), sum_of_squares(&elements));
    }
}
