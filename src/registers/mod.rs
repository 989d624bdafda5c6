//! Architecture register layouts and the per-thread register context built on them.
//!
//! A [`RegisterLayout`] is a static table describing where each logical register lives
//! inside the raw register-file structure the kernel hands back from a bulk register
//! request. The [`RegisterContext`] uses it to extract and insert single registers
//! without a per-register code path.

use std::convert::TryInto;
use std::fmt;

use lazy_static::lazy_static;

use crate::error::{Error, Result};

mod access;
pub mod context;
pub mod x86_64;

pub use access::{PtraceRegisters, RegisterAccess};

#[cfg(target_arch = "x86_64")]
pub(crate) use access::peek_user;
pub use context::{CacheState, RegisterContext};

/// Debugger-level identifier for one architectural register.
///
/// IDs are numbered per architecture, and register-set membership is decided by
/// numeric range. See [`RegisterLayout::set_for()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RegisterId(pub u32);

impl RegisterId {
    /// Marks a register used internally by the debugger, with no backing storage.
    pub const INVALID: RegisterId = RegisterId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "<invalid>")
        }
    }
}

/// Group of registers transferred together by one bulk register request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RegisterSet {
    GeneralPurpose,
    FloatingPoint,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ByteOrder {
    Little,
    Big,

    /// Raw register bytes must not be interpreted without further negotiation.
    Invalid,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Machine {
    X86_64,
    Aarch64,
}

impl Machine {
    #[cfg(target_arch = "x86_64")]
    pub fn host() -> Self {
        Machine::X86_64
    }

    #[cfg(target_arch = "aarch64")]
    pub fn host() -> Self {
        Machine::Aarch64
    }
}

/// Storage of one logical register inside a register set snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterInfo {
    pub id: RegisterId,
    pub name: &'static str,

    /// Generic alias, such as `pc` or `sp`.
    pub alt_name: Option<&'static str>,

    pub set: RegisterSet,

    /// Byte offset into the snapshot of `set`.
    pub offset: usize,

    /// Width in bytes.
    pub size: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterSetDescriptor {
    pub name: &'static str,
    pub short_name: &'static str,
    pub registers: Vec<RegisterId>,
}

impl RegisterSetDescriptor {
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// Register file description for one machine kind.
#[derive(Clone, Debug)]
pub struct RegisterLayout {
    pub machine: Machine,
    pub byte_order: ByteOrder,

    /// Size of the kernel's general-purpose register structure.
    pub gpr_size: usize,

    /// Size of the kernel's floating-point register structure.
    pub fpr_size: usize,

    /// First floating-point register ID. Every ID below it is general-purpose.
    pub first_fpr: u32,

    /// Register infos, indexed by `RegisterId`.
    pub registers: Vec<RegisterInfo>,

    pub sets: Vec<RegisterSetDescriptor>,

    pub pc: RegisterId,

    /// Serialized register files end with an 8-byte `-1` sentinel for `orig_rax`.
    pub legacy_sentinel: bool,

    /// Distance the PC advances past a software breakpoint when it traps.
    pub breakpoint_trap_size: u64,

    pub hw_watchpoint_slots: usize,
}

lazy_static! {
    static ref X86_64_LAYOUT: RegisterLayout = x86_64::layout();
    static ref AARCH64_LAYOUT: RegisterLayout = unpopulated_aarch64_layout();
}

impl RegisterLayout {
    pub fn for_machine(machine: Machine) -> &'static RegisterLayout {
        match machine {
            Machine::X86_64 => &X86_64_LAYOUT,
            Machine::Aarch64 => &AARCH64_LAYOUT,
        }
    }

    pub fn host() -> &'static RegisterLayout {
        Self::for_machine(Machine::host())
    }

    /// Register set containing `id`, if it is backed by a set this layout implements.
    pub fn set_for(&self, id: RegisterId) -> Option<RegisterSet> {
        if id.is_valid() && id.0 < self.first_fpr {
            Some(RegisterSet::GeneralPurpose)
        } else {
            None
        }
    }

    pub fn info(&self, id: RegisterId) -> Option<&RegisterInfo> {
        let info = self.registers.get(id.0 as usize)?;
        debug_assert_eq!(info.id, id);
        Some(info)
    }

    /// Look up a register by name, falling back to its generic alias.
    ///
    /// Names take precedence, so on x86_64 `sp` is the 16-bit register, not the `rsp`
    /// alias. The alias stays in [`RegisterInfo::alt_name`].
    pub fn info_by_name(&self, name: &str) -> Option<&RegisterInfo> {
        self.registers
            .iter()
            .find(|info| info.name == name)
            .or_else(|| self.registers.iter().find(|info| info.alt_name == Some(name)))
    }

    /// Full-width register stored at `offset` of the general-purpose snapshot.
    pub fn info_at_offset(&self, offset: usize) -> Option<&RegisterInfo> {
        self.registers.iter().find(|info| {
            info.set == RegisterSet::GeneralPurpose && info.offset == offset && info.size == 8
        })
    }

    /// Number of register sets with at least one register.
    pub fn populated_set_count(&self) -> usize {
        self.sets.iter().filter(|set| !set.is_empty()).count()
    }

    pub fn set_size(&self, set: RegisterSet) -> usize {
        match set {
            RegisterSet::GeneralPurpose => self.gpr_size,
            RegisterSet::FloatingPoint => self.fpr_size,
        }
    }

    /// Size of a buffer produced by `read_all_register_values()`.
    pub fn register_file_size(&self) -> usize {
        if self.legacy_sentinel {
            self.gpr_size + 8
        } else {
            self.gpr_size
        }
    }
}

// Register sets are declared, but no register is mapped yet.
fn unpopulated_aarch64_layout() -> RegisterLayout {
    use crate::aarch64::{user_fpsimd_state, user_pt_regs};

    RegisterLayout {
        machine: Machine::Aarch64,
        byte_order: ByteOrder::Invalid,
        gpr_size: std::mem::size_of::<user_pt_regs>(),
        fpr_size: std::mem::size_of::<user_fpsimd_state>(),
        first_fpr: 0,
        registers: vec![],
        sets: vec![
            RegisterSetDescriptor {
                name: "General Purpose Registers",
                short_name: "gpr",
                registers: vec![],
            },
            RegisterSetDescriptor {
                name: "Floating Point Registers",
                short_name: "fpu",
                registers: vec![],
            },
        ],
        pc: RegisterId::INVALID,
        legacy_sentinel: false,
        breakpoint_trap_size: 0,
        hw_watchpoint_slots: 0,
    }
}

/// Value of a single register.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RegisterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),

    /// Raw bytes, when the width or byte order does not allow a scalar reading.
    Bytes(Vec<u8>),
}

impl RegisterValue {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            RegisterValue::U8(v) => Some(v.into()),
            RegisterValue::U16(v) => Some(v.into()),
            RegisterValue::U32(v) => Some(v.into()),
            RegisterValue::U64(v) => Some(v),
            RegisterValue::Bytes(_) => None,
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8], order: ByteOrder) -> Self {
        macro_rules! scalar {
            ($ty: ty, $variant: ident) => {{
                // Length is checked by the enclosing match.
                let raw = bytes.try_into().unwrap_or_default();
                match order {
                    ByteOrder::Little => RegisterValue::$variant(<$ty>::from_le_bytes(raw)),
                    _ => RegisterValue::$variant(<$ty>::from_be_bytes(raw)),
                }
            }};
        }

        match (order, bytes.len()) {
            (ByteOrder::Invalid, _) => RegisterValue::Bytes(bytes.to_vec()),
            (_, 1) => RegisterValue::U8(bytes[0]),
            (_, 2) => scalar!(u16, U16),
            (_, 4) => scalar!(u32, U32),
            (_, 8) => scalar!(u64, U64),
            _ => RegisterValue::Bytes(bytes.to_vec()),
        }
    }

    /// Encode into exactly `size` bytes. Scalars wider than `size` keep their low bytes.
    pub(crate) fn to_bytes(&self, size: usize, order: ByteOrder) -> Result<Vec<u8>> {
        if let RegisterValue::Bytes(bytes) = self {
            if bytes.len() != size {
                return Err(Error::SizeMismatch { expected: size, actual: bytes.len() });
            }
            return Ok(bytes.clone());
        }

        let value = self.as_u64().unwrap_or_default();

        if size > 8 {
            return Err(Error::SizeMismatch { expected: size, actual: 8 });
        }

        match order {
            ByteOrder::Little => Ok(value.to_le_bytes()[..size].to_vec()),
            ByteOrder::Big => Ok(value.to_be_bytes()[8 - size..].to_vec()),
            ByteOrder::Invalid => Err(Error::Unsupported("scalar register write with unknown byte order")),
        }
    }
}

impl From<u8> for RegisterValue {
    fn from(v: u8) -> Self {
        RegisterValue::U8(v)
    }
}

impl From<u16> for RegisterValue {
    fn from(v: u16) -> Self {
        RegisterValue::U16(v)
    }
}

impl From<u32> for RegisterValue {
    fn from(v: u32) -> Self {
        RegisterValue::U32(v)
    }
}

impl From<u64> for RegisterValue {
    fn from(v: u64) -> Self {
        RegisterValue::U64(v)
    }
}
