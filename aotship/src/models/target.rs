//! Build targets and host platforms

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating system family of a build target or host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Windows,
    MacOs,
}

impl OsFamily {
    /// Separator used by this OS for path lists such as `PATH` or `LIB`
    pub fn path_list_separator(&self) -> char {
        match self {
            OsFamily::Windows => ';',
            OsFamily::Linux | OsFamily::MacOs => ':',
        }
    }

    /// Extension carried by executables on this OS
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            OsFamily::Windows => ".exe",
            OsFamily::Linux | OsFamily::MacOs => "",
        }
    }

    /// Whether `upx` can compress this OS's executable format.
    ///
    /// Mach-O binaries are rejected by current upx releases.
    pub fn supports_compression(&self) -> bool {
        matches!(self, OsFamily::Linux | OsFamily::Windows)
    }

    fn rid_prefix(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Windows => "win",
            OsFamily::MacOs => "osx",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsFamily::Linux => "Linux",
            OsFamily::Windows => "Windows",
            OsFamily::MacOs => "macOS",
        };
        f.write_str(name)
    }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    Arm64,
    X86,
    Arm,
}

impl Arch {
    fn rid_suffix(&self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
            Arch::X86 => "x86",
            Arch::Arm => "arm",
        }
    }

    /// Directory name used by the xwin splat layout
    pub fn xwin_dir(&self) -> &'static str {
        match self {
            Arch::X64 => "x86_64",
            Arch::Arm64 => "aarch64",
            Arch::X86 => "x86",
            Arch::Arm => "arm",
        }
    }
}

/// C library variant (only meaningful for Linux)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Libc {
    #[default]
    Gnu,
    Musl,
}

/// A platform/architecture pair identified by a runtime identifier such as
/// `linux-x64`, `linux-musl-arm64`, `win-x64` or `osx-arm64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildTarget {
    pub os: OsFamily,
    pub arch: Arch,
    pub libc: Libc,
}

/// Compiler target triples for the supported Linux targets
const LINUX_TRIPLES: &[(Arch, Libc, &str)] = &[
    (Arch::X64, Libc::Gnu, "x86_64-linux-gnu"),
    (Arch::Arm64, Libc::Gnu, "aarch64-linux-gnu"),
    (Arch::Arm, Libc::Gnu, "arm-linux-gnueabihf"),
    (Arch::X86, Libc::Gnu, "x86-linux-gnu"),
    (Arch::X64, Libc::Musl, "x86_64-linux-musl"),
    (Arch::Arm64, Libc::Musl, "aarch64-linux-musl"),
];

impl BuildTarget {
    pub fn new(os: OsFamily, arch: Arch) -> Self {
        Self {
            os,
            arch,
            libc: Libc::Gnu,
        }
    }

    pub fn with_libc(mut self, libc: Libc) -> Self {
        self.libc = libc;
        self
    }

    /// The runtime identifier passed to `dotnet publish -r`
    pub fn rid(&self) -> String {
        match (self.os, self.libc) {
            (OsFamily::Linux, Libc::Musl) => format!("linux-musl-{}", self.arch.rid_suffix()),
            (os, _) => format!("{}-{}", os.rid_prefix(), self.arch.rid_suffix()),
        }
    }

    /// Target triple for Linux targets, `None` for anything else
    pub fn linux_triple(&self) -> Option<&'static str> {
        if self.os != OsFamily::Linux {
            return None;
        }
        LINUX_TRIPLES
            .iter()
            .find(|(arch, libc, _)| *arch == self.arch && *libc == self.libc)
            .map(|(_, _, triple)| *triple)
    }

    /// Cross compilation is needed iff the OS family differs from the host's
    pub fn requires_cross_compile(&self, host: OsFamily) -> bool {
        self.os != host
    }

    /// File name of the executable produced for `assembly_name`
    pub fn executable_name(&self, assembly_name: &str) -> String {
        format!("{}{}", assembly_name, self.os.exe_suffix())
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rid())
    }
}

impl FromStr for BuildTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let parts: Vec<&str> = lower.split('-').collect();

        let (os, libc, arch) = match parts.as_slice() {
            ["linux", "musl", arch] => (OsFamily::Linux, Libc::Musl, *arch),
            ["linux", arch] => (OsFamily::Linux, Libc::Gnu, *arch),
            ["win", arch] => (OsFamily::Windows, Libc::Gnu, *arch),
            ["osx", arch] => (OsFamily::MacOs, Libc::Gnu, *arch),
            _ => return Err(format!("Unknown runtime identifier: {}", s)),
        };

        let arch = match arch {
            "x64" => Arch::X64,
            "arm64" => Arch::Arm64,
            "x86" => Arch::X86,
            "arm" => Arch::Arm,
            other => return Err(format!("Unknown architecture '{}' in {}", other, s)),
        };

        Ok(BuildTarget::new(os, arch).with_libc(libc))
    }
}

impl Serialize for BuildTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.rid())
    }
}

impl<'de> Deserialize<'de> for BuildTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The machine this process runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: OsFamily,
    pub arch: Arch,
}

impl HostPlatform {
    pub fn current() -> Self {
        let os = if cfg!(target_os = "windows") {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else {
            OsFamily::Linux
        };

        let arch = if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else if cfg!(target_arch = "arm") {
            Arch::Arm
        } else {
            Arch::X64
        };

        Self { os, arch }
    }

    /// Build target matching the host, used when no target is configured
    pub fn native_target(&self) -> BuildTarget {
        BuildTarget::new(self.os, self.arch)
    }
}
