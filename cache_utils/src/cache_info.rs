use raw_cpuid::CpuId;

/// What the Flush+Reload primitives need from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSupport {
    pub vendor: String,
    pub brand: String,
    pub has_clflush: bool,
    pub has_tsc: bool,
    pub invariant_tsc: bool,
    /// Bytes evicted by one clflush.
    pub clflush_line_size: usize,
}

impl CpuSupport {
    pub fn detect() -> CpuSupport {
        let cpuid = CpuId::new();
        let vendor = cpuid
            .get_vendor_info()
            .map(|v| v.as_str().to_owned())
            .unwrap_or_default();
        let brand = cpuid
            .get_processor_brand_string()
            .map(|b| b.as_str().trim().to_owned())
            .unwrap_or_default();
        let (has_clflush, has_tsc, clflush_line_size) = match cpuid.get_feature_info() {
            Some(fi) => (
                fi.has_clflush(),
                fi.has_tsc(),
                fi.cflush_cache_line_size() as usize * 8,
            ),
            None => (false, false, 0),
        };
        let invariant_tsc = cpuid
            .get_advanced_power_mgmt_info()
            .map(|apm| apm.has_invariant_tsc())
            .unwrap_or(false);
        CpuSupport {
            vendor,
            brand,
            has_clflush,
            has_tsc,
            invariant_tsc,
            clflush_line_size,
        }
    }

    pub fn can_flush_reload(&self) -> bool {
        self.has_clflush && self.has_tsc
    }
}
