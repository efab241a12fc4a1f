//! ELF64 image inspection and in-place loading.
//!
//! Only statically linked `ET_EXEC` images for x86-64 are accepted.
//! `load_into_current_address_space` must run inside the target address
//! space: segment copies touch unmapped user pages and rely on the
//! page-fault path to provision them.

use phobos_abi::error::ErrorCode;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELF_CLASS_64: u8 = 2;
const ELF_DATA_LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64Header {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64ProgramHeader {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

fn header(data: &[u8]) -> Option<Elf64Header> {
    if data.len() < core::mem::size_of::<Elf64Header>() {
        return None;
    }
    // SAFETY: length checked; the header is plain old data and the buffer
    // carries no alignment guarantee, hence the unaligned read.
    Some(unsafe { core::ptr::read_unaligned(data.as_ptr() as *const Elf64Header) })
}

pub fn is_elf64(data: &[u8]) -> bool {
    let Some(hdr) = header(data) else {
        return false;
    };
    hdr.e_ident[0..4] == ELF_MAGIC
        && hdr.e_ident[4] == ELF_CLASS_64
        && hdr.e_ident[5] == ELF_DATA_LSB
        && hdr.e_type == ET_EXEC
        && hdr.e_machine == EM_X86_64
}

fn program_headers(data: &[u8]) -> impl Iterator<Item = Elf64ProgramHeader> + '_ {
    let (phoff, phentsize, phnum) = match header(data) {
        Some(hdr) => (hdr.e_phoff as usize, hdr.e_phentsize as usize, hdr.e_phnum as usize),
        None => (0, 0, 0),
    };
    (0..phnum).filter_map(move |i| {
        let start = phoff + i * phentsize;
        let end = start + core::mem::size_of::<Elf64ProgramHeader>();
        if end > data.len() {
            return None;
        }
        // SAFETY: bounds checked; plain old data, unaligned source.
        Some(unsafe {
            core::ptr::read_unaligned(data[start..].as_ptr() as *const Elf64ProgramHeader)
        })
    })
}

pub fn entry_point(data: &[u8]) -> u64 {
    header(data).map(|h| h.e_entry).unwrap_or(0)
}

/// First byte past the loaded image: the bump area for argv starts here.
pub fn image_end(data: &[u8]) -> u64 {
    program_headers(data)
        .filter(|ph| ph.p_type == PT_LOAD)
        .map(|ph| ph.p_vaddr + ph.p_memsz)
        .max()
        .unwrap_or(0)
}

/// Copy every loadable segment to its target virtual address, zero-filling
/// where memory size exceeds file size. Returns the entry point.
pub fn load_into_current_address_space(data: &[u8]) -> Result<u64, ErrorCode> {
    if !is_elf64(data) {
        return Err(ErrorCode::EcNoexec);
    }

    for ph in program_headers(data) {
        if ph.p_type != PT_LOAD || ph.p_memsz == 0 {
            continue;
        }
        let file_end = ph.p_offset.checked_add(ph.p_filesz).ok_or(ErrorCode::EcNoexec)?;
        if file_end as usize > data.len() {
            return Err(ErrorCode::EcNoexec);
        }

        let dst = ph.p_vaddr as *mut u8;
        let src = &data[ph.p_offset as usize..file_end as usize];
        // SAFETY: the caller runs inside the target address space; user
        // pages materialise through the fault path as they are touched.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
            core::ptr::write_bytes(dst.add(src.len()), 0, (ph.p_memsz - ph.p_filesz) as usize);
        }
    }

    Ok(entry_point(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;
    use std::vec::Vec;

    fn minimal_elf(e_type: u16, machine: u16) -> Vec<u8> {
        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(&ELF_MAGIC);
        data[4] = ELF_CLASS_64;
        data[5] = ELF_DATA_LSB;
        data[16..18].copy_from_slice(&e_type.to_le_bytes());
        data[18..20].copy_from_slice(&machine.to_le_bytes());
        data[24..32].copy_from_slice(&0x10_0000u64.to_le_bytes()); // e_entry
        data
    }

    #[test]
    fn recognises_static_x86_64_executables() {
        assert!(is_elf64(&minimal_elf(ET_EXEC, EM_X86_64)));
        assert_eq!(entry_point(&minimal_elf(ET_EXEC, EM_X86_64)), 0x10_0000);
    }

    #[test]
    fn rejects_foreign_images() {
        assert!(!is_elf64(&minimal_elf(3, EM_X86_64))); // ET_DYN
        assert!(!is_elf64(&minimal_elf(ET_EXEC, 40))); // ARM
        assert!(!is_elf64(b"#!/bin/sh"));
        assert!(!is_elf64(&[]));
    }

    #[test]
    fn load_refuses_non_elf() {
        assert_eq!(
            load_into_current_address_space(b"MZ not an elf"),
            Err(ErrorCode::EcNoexec)
        );
    }
}
