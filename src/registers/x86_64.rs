//! x86_64 register layout over the Linux `user_regs_struct`.

use memoffset::offset_of;

use super::{ByteOrder, Machine, RegisterId, RegisterInfo, RegisterLayout, RegisterSet, RegisterSetDescriptor};

/// Mirror of `struct user_regs_struct` from `arch/x86/include/asm/user_64.h`.
///
/// Defined here, rather than taken from `libc`, so the layout table is available when
/// inspecting x86_64 register files from any host.
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct user_regs_struct {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

/// Size of `struct user_fpregs_struct` (the `fxsave` area).
pub const FPR_SIZE: usize = 512;

/// Logical register numbering. The order is fixed by the host debugger and must not
/// change: set membership is derived from it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum Reg {
    Rax = 0,
    Rbx,
    Rcx,
    Rdx,
    Rdi,
    Rsi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
    Rflags,
    Cs,
    Fs,
    Gs,
    Ss,
    Ds,
    Es,

    Eax,
    Ebx,
    Ecx,
    Edx,
    Edi,
    Esi,
    Ebp,
    Esp,
    R8d,
    R9d,
    R10d,
    R11d,
    R12d,
    R13d,
    R14d,
    R15d,

    Ax,
    Bx,
    Cx,
    Dx,
    Di,
    Si,
    Bp,
    Sp,
    R8w,
    R9w,
    R10w,
    R11w,
    R12w,
    R13w,
    R14w,
    R15w,

    Ah,
    Bh,
    Ch,
    Dh,
    Al,
    Bl,
    Cl,
    Dl,
    Dil,
    Sil,
    Bpl,
    Spl,
    R8l,
    R9l,
    R10l,
    R11l,
    R12l,
    R13l,
    R14l,
    R15l,

    // First floating-point register.
    Fctrl,
}

impl From<Reg> for RegisterId {
    fn from(reg: Reg) -> RegisterId {
        RegisterId(reg as u32)
    }
}

/// Number of general-purpose registers, including sub-register views.
pub const NUM_GPR_REGISTERS: usize = Reg::Fctrl as usize;

/// Slice of a 64-bit field viewed by a register.
#[derive(Clone, Copy)]
enum Width {
    Q,
    D,
    W,
    // Bits 8..16.
    H,
    // Bits 0..8.
    L,
}

impl Width {
    fn size(self) -> usize {
        match self {
            Width::Q => 8,
            Width::D => 4,
            Width::W => 2,
            Width::H | Width::L => 1,
        }
    }

    fn shift(self) -> usize {
        match self {
            Width::H => 1,
            _ => 0,
        }
    }
}

macro_rules! gpr_table {
    ( $( $reg: ident, $name: literal, $field: ident, $width: ident; )* ) => {
        fn gpr_registers() -> Vec<RegisterInfo> {
            vec![
                $(
                    RegisterInfo {
                        id: Reg::$reg.into(),
                        name: $name,
                        alt_name: alt_name(Reg::$reg),
                        set: RegisterSet::GeneralPurpose,
                        offset: offset_of!(user_regs_struct, $field) + Width::$width.shift(),
                        size: Width::$width.size(),
                    },
                )*
            ]
        }
    };
}

gpr_table! {
    Rax, "rax", rax, Q;
    Rbx, "rbx", rbx, Q;
    Rcx, "rcx", rcx, Q;
    Rdx, "rdx", rdx, Q;
    Rdi, "rdi", rdi, Q;
    Rsi, "rsi", rsi, Q;
    Rbp, "rbp", rbp, Q;
    Rsp, "rsp", rsp, Q;
    R8, "r8", r8, Q;
    R9, "r9", r9, Q;
    R10, "r10", r10, Q;
    R11, "r11", r11, Q;
    R12, "r12", r12, Q;
    R13, "r13", r13, Q;
    R14, "r14", r14, Q;
    R15, "r15", r15, Q;
    Rip, "rip", rip, Q;
    Rflags, "rflags", eflags, Q;
    Cs, "cs", cs, Q;
    Fs, "fs", fs, Q;
    Gs, "gs", gs, Q;
    Ss, "ss", ss, Q;
    Ds, "ds", ds, Q;
    Es, "es", es, Q;

    Eax, "eax", rax, D;
    Ebx, "ebx", rbx, D;
    Ecx, "ecx", rcx, D;
    Edx, "edx", rdx, D;
    Edi, "edi", rdi, D;
    Esi, "esi", rsi, D;
    Ebp, "ebp", rbp, D;
    Esp, "esp", rsp, D;
    R8d, "r8d", r8, D;
    R9d, "r9d", r9, D;
    R10d, "r10d", r10, D;
    R11d, "r11d", r11, D;
    R12d, "r12d", r12, D;
    R13d, "r13d", r13, D;
    R14d, "r14d", r14, D;
    R15d, "r15d", r15, D;

    Ax, "ax", rax, W;
    Bx, "bx", rbx, W;
    Cx, "cx", rcx, W;
    Dx, "dx", rdx, W;
    Di, "di", rdi, W;
    Si, "si", rsi, W;
    Bp, "bp", rbp, W;
    Sp, "sp", rsp, W;
    R8w, "r8w", r8, W;
    R9w, "r9w", r9, W;
    R10w, "r10w", r10, W;
    R11w, "r11w", r11, W;
    R12w, "r12w", r12, W;
    R13w, "r13w", r13, W;
    R14w, "r14w", r14, W;
    R15w, "r15w", r15, W;

    Ah, "ah", rax, H;
    Bh, "bh", rbx, H;
    Ch, "ch", rcx, H;
    Dh, "dh", rdx, H;
    Al, "al", rax, L;
    Bl, "bl", rbx, L;
    Cl, "cl", rcx, L;
    Dl, "dl", rdx, L;
    Dil, "dil", rdi, L;
    Sil, "sil", rsi, L;
    Bpl, "bpl", rbp, L;
    Spl, "spl", rsp, L;
    R8l, "r8l", r8, L;
    R9l, "r9l", r9, L;
    R10l, "r10l", r10, L;
    R11l, "r11l", r11, L;
    R12l, "r12l", r12, L;
    R13l, "r13l", r13, L;
    R14l, "r14l", r14, L;
    R15l, "r15l", r15, L;
}

fn alt_name(reg: Reg) -> Option<&'static str> {
    match reg {
        Reg::Rip => Some("pc"),
        Reg::Rsp => Some("sp"),
        Reg::Rbp => Some("fp"),
        Reg::Rflags => Some("flags"),
        Reg::Rdi => Some("arg1"),
        Reg::Rsi => Some("arg2"),
        Reg::Rdx => Some("arg3"),
        Reg::Rcx => Some("arg4"),
        Reg::R8 => Some("arg5"),
        Reg::R9 => Some("arg6"),
        _ => None,
    }
}

pub(crate) fn layout() -> RegisterLayout {
    let registers = gpr_registers();
    debug_assert_eq!(registers.len(), NUM_GPR_REGISTERS);

    let gpr_ids = registers.iter().map(|info| info.id).collect();

    RegisterLayout {
        machine: Machine::X86_64,
        byte_order: ByteOrder::Little,
        gpr_size: std::mem::size_of::<user_regs_struct>(),
        fpr_size: FPR_SIZE,
        first_fpr: Reg::Fctrl as u32,
        registers,
        sets: vec![
            RegisterSetDescriptor {
                name: "General Purpose Registers",
                short_name: "gpr",
                registers: gpr_ids,
            },
            RegisterSetDescriptor {
                name: "Floating Point Registers",
                short_name: "fpu",
                registers: vec![],
            },
            RegisterSetDescriptor {
                name: "Advanced Vector Extensions",
                short_name: "avx",
                registers: vec![],
            },
        ],
        pc: Reg::Rip.into(),
        legacy_sentinel: true,
        // `int3`
        breakpoint_trap_size: 1,
        hw_watchpoint_slots: 4,
    }
}
