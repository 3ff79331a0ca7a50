//! Physical registers.

use core::fmt;

/// Register file a [`Reg`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegClass {
    /// General-purpose integer register `x0`–`x31`.
    Int,
    /// Floating-point register `f0`–`f31`.
    Float,
}

/// A physical register, already reduced to its 5-bit encoding number.
///
/// The number is not validated on construction; the format encoders reject
/// anything that does not fit five bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reg {
    class: RegClass,
    num: u8,
}

impl Reg {
    /// Integer register `x<num>`.
    #[inline]
    pub const fn x(num: u8) -> Self {
        Self {
            class: RegClass::Int,
            num,
        }
    }

    /// Floating-point register `f<num>`.
    #[inline]
    pub const fn f(num: u8) -> Self {
        Self {
            class: RegClass::Float,
            num,
        }
    }

    /// Encoding number of the register.
    #[inline]
    pub const fn num(self) -> u32 {
        self.num as u32
    }

    /// Register file of the register.
    #[inline]
    pub const fn class(self) -> RegClass {
        self.class
    }

    /// `true` for `f0`–`f31`.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self.class, RegClass::Float)
    }

    /// `true` for the hard-wired zero register `x0`.
    #[inline]
    pub const fn is_zero(self) -> bool {
        matches!(self.class, RegClass::Int) && self.num == 0
    }
}

const INT_ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

const FLOAT_ABI_NAMES: [&str; 32] = [
    "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "fs0", "fs1", "fa0", "fa1", "fa2",
    "fa3", "fa4", "fa5", "fa6", "fa7", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9",
    "fs10", "fs11", "ft8", "ft9", "ft10", "ft11",
];

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = match self.class {
            RegClass::Int => &INT_ABI_NAMES,
            RegClass::Float => &FLOAT_ABI_NAMES,
        };
        match names.get(self.num as usize) {
            Some(name) => f.write_str(name),
            None => match self.class {
                RegClass::Int => write!(f, "x{}", self.num),
                RegClass::Float => write!(f, "f{}", self.num),
            },
        }
    }
}

// ── ABI names ───────────────────────────────────────────────────────────

/// Hard-wired zero.
pub const ZERO: Reg = Reg::x(0);
/// Return address.
pub const RA: Reg = Reg::x(1);
/// Stack pointer.
pub const SP: Reg = Reg::x(2);
/// Global pointer.
pub const GP: Reg = Reg::x(3);
/// Thread pointer.
pub const TP: Reg = Reg::x(4);
/// Temporary 0.
pub const T0: Reg = Reg::x(5);
/// Temporary 1.
pub const T1: Reg = Reg::x(6);
/// Temporary 2, scratch for relocated and absolute calls.
pub const T2: Reg = Reg::x(7);
/// Saved 0 / frame pointer.
pub const S0: Reg = Reg::x(8);
/// Saved 1.
pub const S1: Reg = Reg::x(9);
/// Argument / return 0.
pub const A0: Reg = Reg::x(10);
/// Argument / return 1.
pub const A1: Reg = Reg::x(11);
/// Argument 2.
pub const A2: Reg = Reg::x(12);
/// Argument 3.
pub const A3: Reg = Reg::x(13);
/// Argument 4.
pub const A4: Reg = Reg::x(14);
/// Argument 5.
pub const A5: Reg = Reg::x(15);
/// Argument 6.
pub const A6: Reg = Reg::x(16);
/// Argument 7.
pub const A7: Reg = Reg::x(17);
/// Saved 2.
pub const S2: Reg = Reg::x(18);
/// Saved 3.
pub const S3: Reg = Reg::x(19);
/// Saved 4.
pub const S4: Reg = Reg::x(20);
/// Saved 5.
pub const S5: Reg = Reg::x(21);
/// Saved 6.
pub const S6: Reg = Reg::x(22);
/// Saved 7.
pub const S7: Reg = Reg::x(23);
/// Saved 8.
pub const S8: Reg = Reg::x(24);
/// Saved 9.
pub const S9: Reg = Reg::x(25);
/// Saved 10.
pub const S10: Reg = Reg::x(26);
/// Saved 11.
pub const S11: Reg = Reg::x(27);
/// Temporary 3.
pub const T3: Reg = Reg::x(28);
/// Temporary 4.
pub const T4: Reg = Reg::x(29);
/// Temporary 5.
pub const T5: Reg = Reg::x(30);
/// Temporary 6, reserved scratch for float data-pool loads.
pub const T6: Reg = Reg::x(31);
