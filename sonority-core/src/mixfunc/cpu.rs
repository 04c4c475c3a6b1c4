use super::MixFamily;

/// SIMD capabilities relevant to the mixing kernels.
///
/// The fields are private: a `CpuCaps` only ever reports features that were
/// actually detected, so a table built from it never installs a kernel the CPU
/// cannot run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuCaps {
    sse2: bool,
    avx2: bool,
}

impl CpuCaps {
    /// Query the running CPU.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self {
                sse2: is_x86_feature_detected!("sse2"),
                avx2: is_x86_feature_detected!("avx2"),
            }
        }
        #[cfg(target_arch = "x86")]
        {
            Self {
                sse2: is_x86_feature_detected!("sse2"),
                avx2: false,
            }
        }
        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        {
            Self::none()
        }
    }

    /// No SIMD at all; selects the scalar family.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn sse2(&self) -> bool {
        self.sse2
    }

    pub fn avx2(&self) -> bool {
        self.avx2
    }

    /// Drop every feature wider than `family`.
    pub fn restrict(self, family: MixFamily) -> Self {
        match family {
            MixFamily::Scalar => Self::none(),
            MixFamily::Sse2 => Self {
                sse2: self.sse2,
                avx2: false,
            },
            MixFamily::Avx2 => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restrict_never_adds_features() {
        let caps = CpuCaps::none();
        assert_eq!(caps.restrict(MixFamily::Avx2), caps);

        let detected = CpuCaps::detect();
        let sse_only = detected.restrict(MixFamily::Sse2);
        assert!(!sse_only.avx2());
        assert_eq!(sse_only.sse2(), detected.sse2());
        assert_eq!(detected.restrict(MixFamily::Scalar), CpuCaps::none());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_x86_64_always_has_sse2() {
        assert!(CpuCaps::detect().sse2());
    }
}
