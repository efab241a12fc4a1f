//! Four-level page tables with 2 MiB leaf entries.
//!
//! One [`PageTables64`] block holds every table a single address space
//! needs: the PML4, one PDPT, and three page directories. The kernel owns a
//! static instance; each task group owns one more, carved out of
//! physically-consecutive frames, whose kernel half mirrors the static one.
//!
//! Index map for the three carved virtual regions:
//!   `[0 .. 1 GiB)`        -> pml4[0],   pdpt[0],   pd_user
//!   `[-2 GiB .. -1 GiB)`  -> pml4[511], pdpt[510], pd_kernel_static
//!   `[-1 GiB .. 0)`       -> pml4[511], pdpt[511], pd_kernel_dynamic

use bitflags::bitflags;
use phobos_abi::addr::{PhysAddr, VirtAddr, KERNEL_VIRTUAL_BASE};

use crate::mm_constants::{FRAME_SIZE_2MB, KERNEL_DYNAMIC_BASE, USER_SPACE_SPAN};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT         = 1 << 0;
        const WRITABLE        = 1 << 1;
        const USER_ACCESSIBLE = 1 << 2;
        /// 2 MiB leaf when set in a PD entry.
        const HUGE_PAGE       = 1 << 7;
    }
}

const ENTRY_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

#[repr(C, align(4096))]
pub struct PageTables64 {
    pml4: [u64; 512],
    pdpt: [u64; 512],
    pd_kernel_static: [u64; 512],
    pd_kernel_dynamic: [u64; 512],
    pd_user: [u64; 512],
}

impl PageTables64 {
    pub const fn zeroed() -> Self {
        Self {
            pml4: [0; 512],
            pdpt: [0; 512],
            pd_kernel_static: [0; 512],
            pd_kernel_dynamic: [0; 512],
            pd_user: [0; 512],
        }
    }
}

pub const PAGE_TABLES_BYTES: u64 = core::mem::size_of::<PageTables64>() as u64;

static mut KERNEL_PAGE_TABLES: PageTables64 = PageTables64::zeroed();

fn table_field_phys(tables_phys: PhysAddr, field_offset: usize) -> u64 {
    tables_phys.as_u64() + field_offset as u64
}

/// Fill `tables` (living at physical `tables_phys`) with the kernel half:
/// fixed identity map of the first physical GiB plus the empty dynamic PD.
fn prepare_higher_half(tables: &mut PageTables64, tables_phys: PhysAddr) {
    let table_flags = (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER_ACCESSIBLE).bits();
    let leaf_flags = (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::HUGE_PAGE).bits();

    let pdpt_phys = table_field_phys(tables_phys, core::mem::offset_of!(PageTables64, pdpt));
    let pd_static_phys =
        table_field_phys(tables_phys, core::mem::offset_of!(PageTables64, pd_kernel_static));
    let pd_dynamic_phys =
        table_field_phys(tables_phys, core::mem::offset_of!(PageTables64, pd_kernel_dynamic));

    tables.pml4[511] = pdpt_phys | table_flags;
    tables.pdpt[510] = pd_static_phys | table_flags;
    tables.pdpt[511] = pd_dynamic_phys | table_flags;

    for (i, entry) in tables.pd_kernel_static.iter_mut().enumerate() {
        *entry = (i as u64 * FRAME_SIZE_2MB) | leaf_flags;
    }
    tables.pd_kernel_dynamic.fill(0);
}

/// Add the user half: low-GiB mapping through `pd_user`, demand-filled.
fn prepare_user_half(tables: &mut PageTables64, tables_phys: PhysAddr) {
    let table_flags = (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER_ACCESSIBLE).bits();
    let pdpt_phys = table_field_phys(tables_phys, core::mem::offset_of!(PageTables64, pdpt));
    let pd_user_phys = table_field_phys(tables_phys, core::mem::offset_of!(PageTables64, pd_user));

    tables.pml4[0] = pdpt_phys | table_flags;
    tables.pdpt[0] = pd_user_phys | table_flags;
    tables.pd_user.fill(0);
}

/// Physical address of the kernel's own PML4.
pub fn kernel_pml4_phys_addr() -> PhysAddr {
    let virt = &raw const KERNEL_PAGE_TABLES as u64;
    PhysAddr::new(virt - KERNEL_VIRTUAL_BASE)
}

/// Build the kernel address space and activate it. Runs once, early.
pub fn map_and_load_kernel_address_space() {
    let tables_phys = kernel_pml4_phys_addr();
    // SAFETY: single-threaded boot, before interrupts are enabled.
    let tables = unsafe { &mut *(&raw mut KERNEL_PAGE_TABLES) };
    prepare_higher_half(tables, tables_phys);
    load_address_space(tables_phys);
}

/// Build a fresh task-group address space inside the physically-consecutive
/// block at `tables_phys` (sized [`PAGE_TABLES_BYTES`]). The kernel half is
/// rebuilt identically to the static instance; the user PD starts empty and
/// fills through the page-fault path.
pub fn map_elf_address_space(tables_phys: PhysAddr) {
    let virt = tables_phys.to_virt();
    // SAFETY: the caller owns the frames at `tables_phys`; the block lies in
    // the identity-mapped first GiB.
    let tables = unsafe { &mut *virt.as_mut_ptr::<PageTables64>() };
    *tables = PageTables64::zeroed();
    prepare_higher_half(tables, tables_phys);
    prepare_user_half(tables, tables_phys);
}

/// Write CR3, switching to the address space rooted at `pml4_phys`.
pub fn load_address_space(pml4_phys: PhysAddr) {
    #[cfg(target_os = "none")]
    unsafe {
        use x86_64::registers::control::{Cr3, Cr3Flags};
        use x86_64::structures::paging::PhysFrame;
        let frame =
            PhysFrame::containing_address(x86_64::PhysAddr::new_truncate(pml4_phys.as_u64()));
        Cr3::write(frame, Cr3Flags::empty());
    }
    #[cfg(not(target_os = "none"))]
    let _ = pml4_phys;
}

/// Which of the three mapped regions an address falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtRegion {
    User,
    KernelStatic,
    KernelDynamic,
}

pub fn region_for_virt_address(va: VirtAddr) -> Option<VirtRegion> {
    let addr = va.as_u64();
    if addr < USER_SPACE_SPAN {
        Some(VirtRegion::User)
    } else if (KERNEL_VIRTUAL_BASE..KERNEL_DYNAMIC_BASE).contains(&addr) {
        Some(VirtRegion::KernelStatic)
    } else if addr >= KERNEL_DYNAMIC_BASE {
        Some(VirtRegion::KernelDynamic)
    } else {
        None
    }
}

/// Walk to the 2 MiB leaf entry covering `va` in the address space rooted at
/// `pml4_phys`. Returns a pointer into the live page directory.
pub fn get_page_for_virt_address(va: VirtAddr, pml4_phys: PhysAddr) -> Option<*mut u64> {
    let region = region_for_virt_address(va)?;
    let tables = unsafe { &mut *pml4_phys.to_virt().as_mut_ptr::<PageTables64>() };

    let pd = match region {
        VirtRegion::User => {
            if tables.pml4[0] & PageFlags::PRESENT.bits() == 0 {
                return None;
            }
            &mut tables.pd_user
        }
        VirtRegion::KernelStatic => &mut tables.pd_kernel_static,
        VirtRegion::KernelDynamic => &mut tables.pd_kernel_dynamic,
    };

    let offset_in_region = match region {
        VirtRegion::User => va.as_u64(),
        VirtRegion::KernelStatic => va.as_u64() - KERNEL_VIRTUAL_BASE,
        VirtRegion::KernelDynamic => va.as_u64() - KERNEL_DYNAMIC_BASE,
    };
    let index = (offset_in_region / FRAME_SIZE_2MB) as usize;
    Some(&mut pd[index] as *mut u64)
}

/// Install `frame` as the 2 MiB leaf backing `va`. User-half pages get the
/// user-accessible bit.
pub fn install_page(va: VirtAddr, frame: PhysAddr, pml4_phys: PhysAddr) -> bool {
    let Some(entry) = get_page_for_virt_address(va, pml4_phys) else {
        return false;
    };
    let mut flags = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::HUGE_PAGE;
    if region_for_virt_address(va) == Some(VirtRegion::User) {
        flags |= PageFlags::USER_ACCESSIBLE;
    }
    unsafe { *entry = frame.align_down(FRAME_SIZE_2MB).as_u64() | flags.bits() };
    true
}

/// Read a leaf entry's backing frame, if present.
pub fn entry_frame(entry_value: u64) -> Option<PhysAddr> {
    if entry_value & PageFlags::PRESENT.bits() == 0 {
        None
    } else {
        Some(PhysAddr::new(entry_value & ENTRY_ADDR_MASK))
    }
}

pub fn entry_flags(entry_value: u64) -> PageFlags {
    PageFlags::from_bits_truncate(entry_value)
}

/// Release every user-half frame of a dead address space, then the tables
/// block itself is the caller's to free.
pub fn release_user_half(pml4_phys: PhysAddr) {
    let tables = unsafe { &mut *pml4_phys.to_virt().as_mut_ptr::<PageTables64>() };
    for entry in tables.pd_user.iter_mut() {
        if let Some(frame) = entry_frame(*entry) {
            crate::frame_alloc::free_frame(frame);
        }
        *entry = 0;
    }
}
