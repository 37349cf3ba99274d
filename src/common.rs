//! Common bit manip.

use num_traits::PrimInt;

/// Set the nth bit.
pub fn bit<T: PrimInt>(n: usize) -> T {
    T::one() << n
}

/// Set all bits between the top and bottom (inclusive).
pub fn bits<T: PrimInt>(bottom: usize, top: usize) -> T {
    (bottom..=top).fold(T::zero(), |acc, n| acc | bit::<T>(n))
}

/// Check if the nth bit is set.
pub fn test_bit<T: PrimInt>(val: T, n: usize) -> bool {
    (val & bit::<T>(n)) != T::zero()
}

/// Extract the field between the top and bottom bits (inclusive), shifted down.
pub fn field<T: PrimInt>(val: T, bottom: usize, top: usize) -> T {
    (val & bits::<T>(bottom, top)) >> bottom
}
