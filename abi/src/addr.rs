//! Physical and virtual address newtypes.
//!
//! These `#[repr(transparent)]` wrappers keep physical and virtual addresses
//! from being confused in page-table and allocator code. A [`PhysAddr`] is
//! never dereferenced directly; kernel code reaches physical memory through
//! the fixed higher-half identity window (see [`KERNEL_VIRTUAL_BASE`]).

/// Start of the kernel half. The first GiB of physical RAM is identity
/// mapped here, so `virt = phys + KERNEL_VIRTUAL_BASE` for `phys < 1 GiB`.
pub const KERNEL_VIRTUAL_BASE: u64 = 0xFFFF_FFFF_8000_0000;

/// Size of the physical window covered by the fixed kernel identity map.
pub const KERNEL_IDENTITY_SPAN: u64 = 1 << 30;

/// A physical memory address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

/// A virtual memory address, kernel half or user half.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

impl PhysAddr {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn offset(self, off: u64) -> Self {
        Self(self.0.wrapping_add(off))
    }

    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }

    /// Translate through the fixed kernel identity window.
    /// Only valid for addresses inside the mapped first GiB.
    #[inline]
    pub const fn to_virt(self) -> VirtAddr {
        VirtAddr(self.0.wrapping_add(KERNEL_VIRTUAL_BASE))
    }

    /// Checked variant of [`PhysAddr::to_virt`].
    #[inline]
    pub const fn to_virt_checked(self) -> Option<VirtAddr> {
        if self.0 < KERNEL_IDENTITY_SPAN {
            Some(self.to_virt())
        } else {
            None
        }
    }
}

impl VirtAddr {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn offset(self, off: u64) -> Self {
        Self(self.0.wrapping_add(off))
    }

    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }

    #[inline]
    pub const fn is_kernel_half(self) -> bool {
        self.0 >= KERNEL_VIRTUAL_BASE
    }

    #[inline]
    pub fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    #[inline]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Inverse of the kernel identity window translation.
    #[inline]
    pub const fn to_phys(self) -> PhysAddr {
        PhysAddr(self.0.wrapping_sub(KERNEL_VIRTUAL_BASE))
    }
}
