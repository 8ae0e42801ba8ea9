use crate::{arch::ArchVariant, os::Os};
use anyhow::{anyhow, Result};
use log::debug;
use platforms::{Platform, PlatformReq};
use std::{fmt, str::FromStr};

/// The OS and CPU architecture that release assets are picked for. This is computed once, usually
/// with [`PlatformIdentity::current`], and then passed to everything that needs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformIdentity {
    pub os: Os,
    pub arch: ArchVariant,
}

impl PlatformIdentity {
    const TARGET: &'static str = env!("TARGET");

    #[must_use]
    pub fn new(os: Os, arch: ArchVariant) -> Self {
        Self { os, arch }
    }

    /// Returns the identity of the platform this crate was compiled for.
    ///
    /// # Errors
    ///
    /// This fails if the compile target is not a Windows, Linux, or macOS target.
    pub fn current() -> Result<Self> {
        let req = PlatformReq::from_str(Self::TARGET)?;
        let platform = Platform::ALL
            .iter()
            .find(|p| req.matches(p))
            .ok_or_else(|| anyhow!("could not find any platform matching {}", Self::TARGET))?;
        Self::from_platform(platform)
    }

    /// Converts a target triple description from the `platforms` crate.
    ///
    /// # Errors
    ///
    /// This fails if the platform's OS is not one we pick assets for.
    pub fn from_platform(platform: &Platform) -> Result<Self> {
        let os = Os::from_platform_os(platform.target_os).ok_or_else(|| {
            anyhow!(
                "release assets cannot be picked for this OS ({})",
                platform.target_os
            )
        })?;
        let arch = ArchVariant::from_platform_arch(platform.target_arch);
        debug!("platform {} maps to {os} / {arch:?}", platform.target_triple);

        Ok(Self { os, arch })
    }
}

impl fmt::Display for PlatformIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arch = match &self.arch {
            ArchVariant::X86 => "x86",
            ArchVariant::X86_64 => "x86_64",
            ArchVariant::Arm => "arm",
            ArchVariant::Other(name) => name.as_str(),
        };
        write!(f, "{}/{arch}", self.os)
    }
}
