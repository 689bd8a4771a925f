use serde::Serialize;

const PAGE_SIZE: u64 = 4096;

/// Memory figures for the current process, in bytes. Zero where the
/// platform does not expose them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

impl MemoryUsage {
    pub fn current() -> Self {
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|raw| parse_statm(&raw))
            .unwrap_or_default()
    }

    pub fn resident_mb(&self) -> f64 {
        self.resident_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// `/proc/self/statm` reports sizes in pages: total, resident, shared, ...
fn parse_statm(raw: &str) -> Option<MemoryUsage> {
    let mut fields = raw.split_whitespace().map(|f| f.parse::<u64>().ok());
    let size = fields.next()??;
    let resident = fields.next()??;
    Some(MemoryUsage {
        resident_bytes: resident.saturating_mul(PAGE_SIZE),
        virtual_bytes: size.saturating_mul(PAGE_SIZE),
    })
}
