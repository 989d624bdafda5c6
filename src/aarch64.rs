//! aarch64 kernel register structures.
//!
//! Register sets for this architecture are declared but not yet mapped to logical
//! registers, so only their sizes and regset notes are used.

/// Defined in `include/uapi/linux/elf.h`.
#[cfg_attr(not(target_arch = "aarch64"), allow(dead_code))]
pub(crate) const NT_PRSTATUS: i32 = 0x1;
#[cfg_attr(not(target_arch = "aarch64"), allow(dead_code))]
pub(crate) const NT_PRFPREG: i32 = 0x2;
#[cfg_attr(not(target_arch = "aarch64"), allow(dead_code))]
pub(crate) const NT_ARM_TLS: i32 = 0x401;

/// Defined in `arch/arm64/include/uapi/asm/ptrace.h`.
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct user_pt_regs {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

/// Defined in `arch/arm64/include/uapi/asm/ptrace.h`.
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct user_fpsimd_state {
    pub vregs: [u128; 32],
    pub fpsr: u32,
    pub fpcr: u32,
    reserved: [u32; 2],
}
