//! x86 debug registers, as used for hardware watchpoints.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebugRegister {
    Dr0 = 0,
    Dr1,
    Dr2,
    Dr3,
    Dr4,
    Dr5,
    Dr6,
    Dr7,
}

/// Number of address debug registers, `DR0`-`DR3`.
pub const NUM_SLOTS: usize = 4;

impl DebugRegister {
    /// Address register backing watchpoint `slot`.
    pub fn for_slot(slot: usize) -> Option<Self> {
        match slot {
            0 => Some(DebugRegister::Dr0),
            1 => Some(DebugRegister::Dr1),
            2 => Some(DebugRegister::Dr2),
            3 => Some(DebugRegister::Dr3),
            _ => None,
        }
    }

    /// Return the offset into debug register array in the virtual `user` struct.
    #[cfg(target_arch = "x86_64")]
    pub(crate) fn user_offset(self) -> u64 {
        memoffset::offset_of!(libc::user, u_debugreg) as u64 + 8 * u64::from(self)
    }
}

impl From<DebugRegister> for u64 {
    fn from(dr: DebugRegister) -> u64 {
        dr as u64
    }
}

/// `DR6` status bits `B0`-`B3`, latched by the CPU when a slot triggers.
pub fn dr6_hit(dr6: u64, slot: usize) -> bool {
    dr6 & (1 << slot) != 0
}

/// Clear all `DR6` hit latches.
pub fn dr6_clear_hits(dr6: u64) -> u64 {
    dr6 & !0xf
}

/// `DR7` breakpoint condition, bits `R/W0`-`R/W3`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Condition {
    Execute = 0b00,
    Write = 0b01,
    ReadWrite = 0b11,
}

/// Return `true` if neither the local nor global enable bit of `slot` is set.
pub fn dr7_vacant(dr7: u64, slot: usize) -> bool {
    dr7 & (0b11 << (2 * slot)) == 0
}

fn dr7_len_bits(size: usize) -> Option<u64> {
    match size {
        1 => Some(0b00),
        2 => Some(0b01),
        4 => Some(0b11),
        8 => Some(0b10),
        _ => None,
    }
}

// Enable, condition, and length bits belonging to `slot`.
fn dr7_slot_mask(slot: usize) -> u64 {
    (0b11 << (2 * slot)) | (0b1111 << (16 + 4 * slot))
}

/// Locally enable `slot` for an access of `size` bytes.
///
/// Returns `None` if `size` is not encodable.
pub fn dr7_enable(dr7: u64, slot: usize, condition: Condition, size: usize) -> Option<u64> {
    let len = dr7_len_bits(size)?;
    let bits = (1 << (2 * slot)) | ((condition as u64 | (len << 2)) << (16 + 4 * slot));

    Some((dr7 & !dr7_slot_mask(slot)) | bits)
}

/// Disable `slot` and clear its condition and length.
pub fn dr7_disable(dr7: u64, slot: usize) -> u64 {
    dr7 & !dr7_slot_mask(slot)
}
