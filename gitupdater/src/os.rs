use platforms::OS;

/// The operating systems we can pick release assets for. The lowercase form of each variant is
/// the token we look for in asset names.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Os {
    Windows,
    Linux,
    Darwin,
}

impl Os {
    // `platforms` adds variants over time.
    #[allow(clippy::wildcard_enum_match_arm)]
    pub(crate) fn from_platform_os(os: OS) -> Option<Os> {
        match os {
            OS::Windows => Some(Os::Windows),
            OS::Linux => Some(Os::Linux),
            OS::MacOS => Some(Os::Darwin),
            _ => None,
        }
    }

    pub(crate) fn token(self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::Linux => "linux",
            Os::Darwin => "darwin",
        }
    }

    // Plain substring check, so `tool_windowsx64.zip` matches, and so does `notwindows`.
    pub(crate) fn name_matches(self, name: &str) -> bool {
        name.to_lowercase().contains(self.token())
    }
}
