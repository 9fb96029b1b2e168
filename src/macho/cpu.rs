//! Mach-O CPU types: constants, names, and selection tokens.

use crate::error::{InspectError, Result};

/// Mach-O CPU type constants, named as in `<mach/machine.h>`.
pub mod cpu_type {
    #![allow(missing_docs)]

    pub const VAX: i32 = 1;
    pub const MC680X0: i32 = 6;
    pub const X86: i32 = 7;
    pub const X86_64: i32 = X86 | ABI64;
    pub const MC98000: i32 = 10;
    pub const HPPA: i32 = 11;
    pub const ARM: i32 = 12;
    pub const ARM64: i32 = ARM | ABI64;
    pub const ARM64_32: i32 = ARM | ABI64_32;
    pub const MC88000: i32 = 13;
    pub const SPARC: i32 = 14;
    pub const I860: i32 = 15;
    pub const POWERPC: i32 = 18;
    pub const POWERPC64: i32 = POWERPC | ABI64;

    /// CPU_ARCH_ABI64 flag
    pub const ABI64: i32 = 0x0100_0000;
    /// CPU_ARCH_ABI64_32 flag (ILP32 on 64-bit hardware)
    pub const ABI64_32: i32 = 0x0200_0000;
}

/// Mach-O ARM subtypes (`CPU_SUBTYPE_ARM_*`).
pub mod arm_subtype {
    #![allow(missing_docs)]

    pub const V6: i32 = 6;
    pub const V7: i32 = 9;
    pub const V7S: i32 = 11;
    pub const V7K: i32 = 12;
    pub const V8: i32 = 13;
}

/// Mach-O ARM64 subtypes (`CPU_SUBTYPE_ARM64_*`).
pub mod arm64_subtype {
    #![allow(missing_docs)]

    pub const ALL: i32 = 0;
    pub const V8: i32 = 1;
    /// ARMv8.3+ with pointer authentication
    pub const E: i32 = 2;
}

/// Mach-O x86_64 subtypes (`CPU_SUBTYPE_X86_64_*`).
pub mod x86_64_subtype {
    #![allow(missing_docs)]

    pub const ALL: i32 = 3;
    pub const H: i32 = 8;
}

/// Capability bits in the high byte of a subtype.
pub const CPU_SUBTYPE_MASK: i32 = i32::from_ne_bytes(0xFF00_0000_u32.to_ne_bytes());

/// Short name of a CPU type, `UNKNOWN` if not listed.
pub fn cpu_type_name(cpu_type: i32) -> &'static str {
    match cpu_type {
        cpu_type::VAX => "VAX",
        cpu_type::MC680X0 => "MC680X0",
        cpu_type::X86 => "X86",
        cpu_type::X86_64 => "X86_64",
        cpu_type::MC98000 => "MC98000",
        cpu_type::HPPA => "HPPA",
        cpu_type::ARM => "ARM",
        cpu_type::ARM64 => "ARM64",
        cpu_type::ARM64_32 => "ARM64_32",
        cpu_type::MC88000 => "MC88000",
        cpu_type::SPARC => "SPARC",
        cpu_type::I860 => "I860",
        cpu_type::POWERPC => "PPC",
        cpu_type::POWERPC64 => "PPC64",
        _ => "UNKNOWN",
    }
}

/// Subtype name for the common Apple targets.
pub fn cpu_subtype_name(cpu_type: i32, cpu_subtype: i32) -> Option<&'static str> {
    let subtype = cpu_subtype & !CPU_SUBTYPE_MASK;
    match cpu_type {
        cpu_type::ARM64 => match subtype {
            arm64_subtype::ALL => Some("arm64"),
            arm64_subtype::V8 => Some("arm64v8"),
            arm64_subtype::E => Some("arm64e"),
            _ => None,
        },
        cpu_type::X86_64 => match subtype {
            x86_64_subtype::ALL => Some("x86_64"),
            x86_64_subtype::H => Some("x86_64h"),
            _ => None,
        },
        cpu_type::ARM => match subtype {
            arm_subtype::V6 => Some("armv6"),
            arm_subtype::V7 => Some("armv7"),
            arm_subtype::V7S => Some("armv7s"),
            arm_subtype::V7K => Some("armv7k"),
            arm_subtype::V8 => Some("armv8"),
            _ => None,
        },
        _ => None,
    }
}

/// Interpret a CPU-type selection token.
///
/// Accepts `arm`, `arm64`, `x86`/`i386`, `x86_64`/`amd64`, `ppc`, `ppc64`
/// (case-sensitive), or an integer literal in decimal or `0x` hex.
pub fn parse_cpu_type(token: &str) -> Result<i32> {
    let cpu = match token {
        "arm" => cpu_type::ARM,
        "arm64" => cpu_type::ARM64,
        "x86" | "i386" => cpu_type::X86,
        "x86_64" | "amd64" => cpu_type::X86_64,
        "ppc" => cpu_type::POWERPC,
        "ppc64" => cpu_type::POWERPC64,
        _ => {
            let raw = parse_integer(token).ok_or_else(|| InspectError::UnknownArchitecture {
                token: token.to_string(),
            })?;
            // Raw values keep their bit pattern, so 0xFFFFFFFF is CPU_TYPE_ANY.
            i32::from_ne_bytes(raw.to_ne_bytes())
        }
    };
    Ok(cpu)
}

fn parse_integer(token: &str) -> Option<u32> {
    if let Some(digits) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        u32::from_str_radix(digits, 16).ok()
    } else {
        token.parse::<u32>().ok()
    }
}
