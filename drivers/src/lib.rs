#![no_std]

pub mod ata;
pub mod pic;
pub mod pit;
pub mod ps2;
pub mod serial;
pub mod vga;

#[cfg(test)]
extern crate std;
