use std::fmt;

use bytemuck::Pod;
use half::f16;

/// The storage precision of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Full,
    Half,
}

/// A value that can live in a device buffer.
///
/// Gradients are stored either as `f32` or as `f16`; the arithmetic on them is
/// always done after widening to `f32`.
pub trait Element: Pod + Default + Send + Sync + fmt::Debug + 'static {
    const PRECISION: Precision;

    fn widen(self) -> f32;

    fn narrow(value: f32) -> Self;

    fn is_finite(self) -> bool {
        self.widen().is_finite()
    }
}

impl Element for f32 {
    const PRECISION: Precision = Precision::Full;

    #[inline]
    fn widen(self) -> f32 {
        self
    }

    #[inline]
    fn narrow(value: f32) -> Self {
        value
    }
}

impl Element for f16 {
    const PRECISION: Precision = Precision::Half;

    #[inline]
    fn widen(self) -> f32 {
        self.to_f32()
    }

    #[inline]
    fn narrow(value: f32) -> Self {
        f16::from_f32(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_overflow_is_not_finite() {
        assert!(!<f16 as Element>::narrow(1e6).is_finite());
        assert!(<f16 as Element>::narrow(1024.).is_finite());
        assert!(!Element::is_finite(f32::NAN));
    }

    #[test]
    fn narrowing_rounds_to_the_nearest_half() {
        let narrowed = <f16 as Element>::narrow(0.1);

        assert!((narrowed.widen() - 0.1).abs() < 1e-4);
    }
}
