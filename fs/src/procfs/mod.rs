//! Read-only synthetic files under `/proc`.
//!
//! Content is generated as a text snapshot at `open()` time and served from
//! the per-open buffer, so concurrent readers never see a torn view.
//! Task-table and mount-table snapshots come from providers the kernel
//! registers at boot; everything else is gathered right here.

use alloc::format;
use alloc::string::String;

use spin::Once;

/// Filled in by the task kernel: a text dump of the live task table.
static PSINFO_PROVIDER: Once<fn() -> String> = Once::new();
/// Filled in by the boot code: milliseconds since boot.
static UPTIME_MS_PROVIDER: Once<fn() -> u64> = Once::new();
/// Filled in by the VFS: a text dump of the mounted volumes.
static MOUNTINFO_PROVIDER: Once<fn() -> String> = Once::new();

pub fn register_psinfo_provider(provider: fn() -> String) {
    PSINFO_PROVIDER.call_once(|| provider);
}

pub fn register_uptime_provider(provider: fn() -> u64) {
    UPTIME_MS_PROVIDER.call_once(|| provider);
}

pub fn register_mountinfo_provider(provider: fn() -> String) {
    MOUNTINFO_PROVIDER.call_once(|| provider);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcEntryKind {
    CpuInfo,
    MemInfo,
    Date,
    PsInfo,
    MountInfo,
    Kmsg,
}

impl ProcEntryKind {
    pub const ALL: [ProcEntryKind; 6] = [
        ProcEntryKind::CpuInfo,
        ProcEntryKind::MemInfo,
        ProcEntryKind::Date,
        ProcEntryKind::PsInfo,
        ProcEntryKind::MountInfo,
        ProcEntryKind::Kmsg,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ProcEntryKind::CpuInfo => "cpuinfo",
            ProcEntryKind::MemInfo => "meminfo",
            ProcEntryKind::Date => "date",
            ProcEntryKind::PsInfo => "psinfo",
            ProcEntryKind::MountInfo => "mountinfo",
            ProcEntryKind::Kmsg => "kmsg",
        }
    }

    /// Generate the snapshot this entry serves.
    pub fn generate(self) -> String {
        match self {
            ProcEntryKind::CpuInfo => generate_cpuinfo(),
            ProcEntryKind::MemInfo => generate_meminfo(),
            ProcEntryKind::Date => generate_date(),
            ProcEntryKind::PsInfo => provider_or_empty(&PSINFO_PROVIDER),
            ProcEntryKind::MountInfo => provider_or_empty(&MOUNTINFO_PROVIDER),
            ProcEntryKind::Kmsg => generate_kmsg(),
        }
    }
}

fn provider_or_empty(provider: &Once<fn() -> String>) -> String {
    match provider.get() {
        Some(f) => f(),
        None => String::new(),
    }
}

#[cfg(target_arch = "x86_64")]
fn cpu_vendor_and_brand() -> (String, String) {
    use core::arch::x86_64::__cpuid;

    // SAFETY: cpuid leaf 0 is available on every x86-64 CPU.
    let leaf0 = __cpuid(0);
    let mut vendor = [0u8; 12];
    vendor[0..4].copy_from_slice(&leaf0.ebx.to_le_bytes());
    vendor[4..8].copy_from_slice(&leaf0.edx.to_le_bytes());
    vendor[8..12].copy_from_slice(&leaf0.ecx.to_le_bytes());

    let mut brand = [0u8; 48];
    let max_extended = __cpuid(0x8000_0000).eax;
    if max_extended >= 0x8000_0004 {
        for (i, leaf) in (0x8000_0002u32..=0x8000_0004).enumerate() {
            let regs = __cpuid(leaf);
            let base = i * 16;
            brand[base..base + 4].copy_from_slice(&regs.eax.to_le_bytes());
            brand[base + 4..base + 8].copy_from_slice(&regs.ebx.to_le_bytes());
            brand[base + 8..base + 12].copy_from_slice(&regs.ecx.to_le_bytes());
            brand[base + 12..base + 16].copy_from_slice(&regs.edx.to_le_bytes());
        }
    }

    let vendor = String::from(core::str::from_utf8(&vendor).unwrap_or("unknown"));
    let brand_trimmed = phobos_lib::string::rtrim(&brand);
    let brand = String::from(core::str::from_utf8(brand_trimmed).unwrap_or("unknown"));
    (vendor, brand)
}

#[cfg(not(target_arch = "x86_64"))]
fn cpu_vendor_and_brand() -> (String, String) {
    (String::from("unknown"), String::from("unknown"))
}

fn generate_cpuinfo() -> String {
    let (vendor, brand) = cpu_vendor_and_brand();
    format!("vendor: {}\nmodel: {}\n", vendor, brand)
}

fn generate_meminfo() -> String {
    let frame_size = phobos_mm::frame_size();
    let total_frames = phobos_mm::total_frames_count();
    let used_frames = phobos_mm::used_frames_count();
    format!(
        "frames: {} used / {} total ({} KiB each)\nheap: {} free / {} total bytes\n",
        used_frames,
        total_frames,
        frame_size / 1024,
        phobos_mm::kernel_heap::heap_free_bytes(),
        phobos_mm::kernel_heap::heap_total_bytes(),
    )
}

fn generate_date() -> String {
    let uptime_ms = match UPTIME_MS_PROVIDER.get() {
        Some(f) => f(),
        None => 0,
    };
    let secs = uptime_ms / 1000;
    format!(
        "uptime: {}d {:02}:{:02}:{:02}.{:03}\n",
        secs / 86400,
        secs / 3600 % 24,
        secs / 60 % 60,
        secs % 60,
        uptime_ms % 1000
    )
}

fn generate_kmsg() -> String {
    let mut out = String::new();
    let mut buf = [0u8; 512];
    let mut offset = 0;
    loop {
        let n = phobos_lib::kmsg::kmsg_read(offset, &mut buf);
        if n == 0 {
            break;
        }
        out.push_str(core::str::from_utf8(&buf[..n]).unwrap_or(""));
        offset += n;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        let names: std::vec::Vec<&str> = ProcEntryKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            ["cpuinfo", "meminfo", "date", "psinfo", "mountinfo", "kmsg"]
        );
    }

    #[test]
    fn cpuinfo_mentions_vendor() {
        assert!(generate_cpuinfo().starts_with("vendor:"));
    }

    #[test]
    fn date_formats_uptime() {
        assert!(generate_date().starts_with("uptime:"));
    }
}
