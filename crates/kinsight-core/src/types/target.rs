//! Target architecture description.

use std::fmt;
use std::str::FromStr;

/// CPU architecture of the system a snapshot was taken from
///
/// The architecture decides the width of pointers (and therefore of pointer
/// type descriptors) and the byte order used to decode scalars. All supported
/// targets are little-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit x86 (Intel/AMD)
    #[default]
    X86_64,
    /// 32-bit x86 (i386 and later)
    X86,
    /// 64-bit ARM
    Arm64,
}

impl Architecture
{
    /// Size of a pointer in bytes for this architecture.
    ///
    /// ```rust
    /// use kinsight_core::types::Architecture;
    ///
    /// assert_eq!(Architecture::X86_64.pointer_size(), 8);
    /// assert_eq!(Architecture::X86.pointer_size(), 4);
    /// ```
    #[must_use]
    pub const fn pointer_size(self) -> usize
    {
        match self {
            Architecture::X86_64 | Architecture::Arm64 => 8,
            Architecture::X86 => 4,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::X86 => "x86",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" | "x86-64" => Ok(Architecture::X86_64),
            "x86" | "i386" | "i686" => Ok(Architecture::X86),
            "arm64" | "aarch64" => Ok(Architecture::Arm64),
            _ => Err(format!("Unknown architecture: {s}. Use 'x86_64', 'x86' or 'arm64'")),
        }
    }
}
