//! SIMD dispatch (§9 design notes): a runtime-selected kernel width for the
//! classification/brute-force batch loop. Functional semantics are
//! identical across widths; only the candidate-batch chunk size changes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdWidth {
    None,
    Mmx,
    Sse2,
    Avx,
    Avx2,
    Avx512,
}

impl SimdWidth {
    /// Candidate-batch chunk size this width processes per iteration.
    pub fn batch_size(&self) -> usize {
        match self {
            SimdWidth::None => 1,
            SimdWidth::Mmx => 2,
            SimdWidth::Sse2 => 4,
            SimdWidth::Avx => 8,
            SimdWidth::Avx2 => 8,
            SimdWidth::Avx512 => 16,
        }
    }
}

/// Pick the widest width the running CPU actually supports. Falls back to
/// `None` on non-x86 targets or when no feature is detected.
pub fn auto_detect() -> SimdWidth {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("avx512f") {
            return SimdWidth::Avx512;
        }
        if std::is_x86_feature_detected!("avx2") {
            return SimdWidth::Avx2;
        }
        if std::is_x86_feature_detected!("avx") {
            return SimdWidth::Avx;
        }
        if std::is_x86_feature_detected!("sse2") {
            return SimdWidth::Sse2;
        }
    }
    SimdWidth::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_sizes_increase_with_width() {
        assert!(SimdWidth::Sse2.batch_size() >= SimdWidth::None.batch_size());
        assert!(SimdWidth::Avx512.batch_size() >= SimdWidth::Avx2.batch_size());
    }

    #[test]
    fn auto_detect_returns_a_supported_width() {
        // Just exercise the call path; the result is host-dependent.
        let _ = auto_detect();
    }
}
