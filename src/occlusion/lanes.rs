/// Four-wide lane types for the batched binning and 2x2-quad rasterization paths.
///
/// On x86_64 the lanes live in SSE2 registers (always available on that target).
/// Everywhere else they are plain arrays that the compiler is free to vectorize.
/// Both backends follow the same IEEE single-precision and wrapping-integer
/// semantics as the scalar code, lane by lane, so results are bit-identical.
use std::ops::Mul;

/// Number of lanes processed per batch.
pub const LANES: usize = 4;
/// Bit mask with one bit set per lane.
pub const LANE_MASK: u32 = (1 << LANES) - 1;

#[cfg(target_arch = "x86_64")]
pub use sse2::{F32x4, I32x4};

#[cfg(not(target_arch = "x86_64"))]
pub use portable::{F32x4, I32x4};

#[cfg(target_arch = "x86_64")]
#[allow(unused_unsafe)]
mod sse2 {
    use core::arch::x86_64::*;

    #[derive(Copy, Clone, Debug)]
    #[repr(transparent)]
    pub struct F32x4(pub(super) __m128);

    #[derive(Copy, Clone, Debug)]
    #[repr(transparent)]
    pub struct I32x4(pub(super) __m128i);

    impl F32x4 {
        #[inline(always)]
        pub fn splat(v: f32) -> Self {
            unsafe { F32x4(_mm_set1_ps(v)) }
        }

        #[inline(always)]
        pub fn from_array(a: [f32; 4]) -> Self {
            unsafe { F32x4(_mm_loadu_ps(a.as_ptr())) }
        }

        #[inline(always)]
        pub fn to_array(self) -> [f32; 4] {
            let mut out = [0.0f32; 4];
            unsafe { _mm_storeu_ps(out.as_mut_ptr(), self.0) };
            out
        }

        /// Load four consecutive floats.
        ///
        /// # Safety
        /// `ptr` must be valid for reading four `f32`s.
        #[inline(always)]
        pub unsafe fn load_ptr(ptr: *const f32) -> Self {
            F32x4(_mm_loadu_ps(ptr))
        }

        /// Store four consecutive floats.
        ///
        /// # Safety
        /// `ptr` must be valid for writing four `f32`s.
        #[inline(always)]
        pub unsafe fn store_ptr(self, ptr: *mut f32) {
            _mm_storeu_ps(ptr, self.0)
        }

        /// Per lane `if self > other { self } else { other }`.
        #[inline(always)]
        pub fn max(self, other: Self) -> Self {
            unsafe { F32x4(_mm_max_ps(self.0, other.0)) }
        }

        /// All-ones lanes where `self > other`.
        #[inline(always)]
        pub fn gt(self, other: Self) -> I32x4 {
            unsafe { I32x4(_mm_castps_si128(_mm_cmpgt_ps(self.0, other.0))) }
        }

        /// Pick `if_negative` in lanes whose `mask` is negative, `otherwise` elsewhere.
        #[inline(always)]
        pub fn select_negative(mask: I32x4, if_negative: Self, otherwise: Self) -> Self {
            unsafe {
                let m = _mm_castsi128_ps(_mm_srai_epi32(mask.0, 31));
                F32x4(_mm_or_ps(
                    _mm_and_ps(m, if_negative.0),
                    _mm_andnot_ps(m, otherwise.0),
                ))
            }
        }
    }

    impl I32x4 {
        #[inline(always)]
        pub fn splat(v: i32) -> Self {
            unsafe { I32x4(_mm_set1_epi32(v)) }
        }

        #[inline(always)]
        pub fn from_array(a: [i32; 4]) -> Self {
            unsafe { I32x4(_mm_loadu_si128(a.as_ptr() as *const __m128i)) }
        }

        #[inline(always)]
        pub fn to_array(self) -> [i32; 4] {
            let mut out = [0i32; 4];
            unsafe { _mm_storeu_si128(out.as_mut_ptr() as *mut __m128i, self.0) };
            out
        }

        #[inline(always)]
        pub fn to_f32(self) -> F32x4 {
            unsafe { F32x4(_mm_cvtepi32_ps(self.0)) }
        }

        /// All-ones lanes where `self > other`.
        #[inline(always)]
        pub fn gt(self, other: Self) -> Self {
            unsafe { I32x4(_mm_cmpgt_epi32(self.0, other.0)) }
        }

        #[inline(always)]
        pub fn min(self, other: Self) -> Self {
            unsafe {
                let m = _mm_cmpgt_epi32(self.0, other.0);
                I32x4(_mm_or_si128(_mm_and_si128(m, other.0), _mm_andnot_si128(m, self.0)))
            }
        }

        #[inline(always)]
        pub fn max(self, other: Self) -> Self {
            unsafe {
                let m = _mm_cmpgt_epi32(self.0, other.0);
                I32x4(_mm_or_si128(_mm_and_si128(m, self.0), _mm_andnot_si128(m, other.0)))
            }
        }

        /// One bit per lane, set where the lane's sign bit is set.
        #[inline(always)]
        pub fn movemask(self) -> u32 {
            unsafe { _mm_movemask_ps(_mm_castsi128_ps(self.0)) as u32 }
        }
    }

    impl std::ops::Add for F32x4 {
        type Output = Self;
        #[inline(always)]
        fn add(self, rhs: Self) -> Self {
            unsafe { F32x4(_mm_add_ps(self.0, rhs.0)) }
        }
    }

    impl std::ops::Sub for F32x4 {
        type Output = Self;
        #[inline(always)]
        fn sub(self, rhs: Self) -> Self {
            unsafe { F32x4(_mm_sub_ps(self.0, rhs.0)) }
        }
    }

    impl std::ops::Mul for F32x4 {
        type Output = Self;
        #[inline(always)]
        fn mul(self, rhs: Self) -> Self {
            unsafe { F32x4(_mm_mul_ps(self.0, rhs.0)) }
        }
    }

    impl std::ops::Div for F32x4 {
        type Output = Self;
        #[inline(always)]
        fn div(self, rhs: Self) -> Self {
            unsafe { F32x4(_mm_div_ps(self.0, rhs.0)) }
        }
    }

    impl std::ops::Add for I32x4 {
        type Output = Self;
        #[inline(always)]
        fn add(self, rhs: Self) -> Self {
            unsafe { I32x4(_mm_add_epi32(self.0, rhs.0)) }
        }
    }

    impl std::ops::Sub for I32x4 {
        type Output = Self;
        #[inline(always)]
        fn sub(self, rhs: Self) -> Self {
            unsafe { I32x4(_mm_sub_epi32(self.0, rhs.0)) }
        }
    }

    impl std::ops::BitOr for I32x4 {
        type Output = Self;
        #[inline(always)]
        fn bitor(self, rhs: Self) -> Self {
            unsafe { I32x4(_mm_or_si128(self.0, rhs.0)) }
        }
    }

    impl std::ops::BitAnd for I32x4 {
        type Output = Self;
        #[inline(always)]
        fn bitand(self, rhs: Self) -> Self {
            unsafe { I32x4(_mm_and_si128(self.0, rhs.0)) }
        }
    }
}

#[cfg(not(target_arch = "x86_64"))]
mod portable {
    #[derive(Copy, Clone, Debug)]
    pub struct F32x4(pub(super) [f32; 4]);

    #[derive(Copy, Clone, Debug)]
    pub struct I32x4(pub(super) [i32; 4]);

    impl F32x4 {
        #[inline(always)]
        pub fn splat(v: f32) -> Self {
            F32x4([v; 4])
        }

        #[inline(always)]
        pub fn from_array(a: [f32; 4]) -> Self {
            F32x4(a)
        }

        #[inline(always)]
        pub fn to_array(self) -> [f32; 4] {
            self.0
        }

        /// # Safety
        /// `ptr` must be valid for reading four `f32`s.
        #[inline(always)]
        pub unsafe fn load_ptr(ptr: *const f32) -> Self {
            F32x4(std::ptr::read_unaligned(ptr as *const [f32; 4]))
        }

        /// # Safety
        /// `ptr` must be valid for writing four `f32`s.
        #[inline(always)]
        pub unsafe fn store_ptr(self, ptr: *mut f32) {
            std::ptr::write_unaligned(ptr as *mut [f32; 4], self.0)
        }

        #[inline(always)]
        pub fn max(self, other: Self) -> Self {
            F32x4(std::array::from_fn(|i| {
                if self.0[i] > other.0[i] {
                    self.0[i]
                } else {
                    other.0[i]
                }
            }))
        }

        #[inline(always)]
        pub fn gt(self, other: Self) -> I32x4 {
            I32x4(std::array::from_fn(|i| if self.0[i] > other.0[i] { -1 } else { 0 }))
        }

        #[inline(always)]
        pub fn select_negative(mask: I32x4, if_negative: Self, otherwise: Self) -> Self {
            F32x4(std::array::from_fn(|i| {
                if mask.0[i] < 0 {
                    if_negative.0[i]
                } else {
                    otherwise.0[i]
                }
            }))
        }
    }

    impl I32x4 {
        #[inline(always)]
        pub fn splat(v: i32) -> Self {
            I32x4([v; 4])
        }

        #[inline(always)]
        pub fn from_array(a: [i32; 4]) -> Self {
            I32x4(a)
        }

        #[inline(always)]
        pub fn to_array(self) -> [i32; 4] {
            self.0
        }

        #[inline(always)]
        pub fn to_f32(self) -> F32x4 {
            F32x4(self.0.map(|v| v as f32))
        }

        #[inline(always)]
        pub fn gt(self, other: Self) -> Self {
            I32x4(std::array::from_fn(|i| if self.0[i] > other.0[i] { -1 } else { 0 }))
        }

        #[inline(always)]
        pub fn min(self, other: Self) -> Self {
            I32x4(std::array::from_fn(|i| self.0[i].min(other.0[i])))
        }

        #[inline(always)]
        pub fn max(self, other: Self) -> Self {
            I32x4(std::array::from_fn(|i| self.0[i].max(other.0[i])))
        }

        #[inline(always)]
        pub fn movemask(self) -> u32 {
            self.0
                .iter()
                .enumerate()
                .fold(0, |acc, (i, &v)| acc | (((v as u32) >> 31) << i))
        }
    }

    macro_rules! lane_op {
        ($ty:ident, $trait:ident, $fn:ident, |$a:ident, $b:ident| $body:expr) => {
            impl std::ops::$trait for $ty {
                type Output = Self;
                #[inline(always)]
                fn $fn(self, rhs: Self) -> Self {
                    $ty(std::array::from_fn(|i| {
                        let ($a, $b) = (self.0[i], rhs.0[i]);
                        $body
                    }))
                }
            }
        };
    }

    lane_op!(F32x4, Add, add, |a, b| a + b);
    lane_op!(F32x4, Sub, sub, |a, b| a - b);
    lane_op!(F32x4, Mul, mul, |a, b| a * b);
    lane_op!(F32x4, Div, div, |a, b| a / b);
    lane_op!(I32x4, Add, add, |a, b| a.wrapping_add(b));
    lane_op!(I32x4, Sub, sub, |a, b| a.wrapping_sub(b));
    lane_op!(I32x4, BitOr, bitor, |a, b| a | b);
    lane_op!(I32x4, BitAnd, bitand, |a, b| a & b);
}

// SSE2 has no packed 32-bit multiply; setup code is not hot, so go through lanes.
impl Mul for I32x4 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        let (a, b) = (self.to_array(), rhs.to_array());
        I32x4::from_array(std::array::from_fn(|i| a[i].wrapping_mul(b[i])))
    }
}
