use crate::os::Os;
use itertools::Itertools;
use std::path::Path;
use strum::{EnumIter, IntoEnumIterator};

/// The file extensions that change how a downloaded asset is handled. Anything else is treated as
/// an opaque file.
#[derive(Clone, Copy, Debug, EnumIter, PartialEq, Eq)]
pub(crate) enum Extension {
    AppImage,
    Deb,
    Dmg,
    Exe,
    Msi,
    Rar,
    SevenZ,
    Tar,
    TarBz,
    TarBz2,
    TarGz,
    TarXz,
    TarZst,
    Tbz,
    Tgz,
    Txz,
    Zip,
}

impl Extension {
    pub(crate) fn extension(self) -> &'static str {
        match self {
            Extension::AppImage => ".appimage",
            Extension::Deb => ".deb",
            Extension::Dmg => ".dmg",
            Extension::Exe => ".exe",
            Extension::Msi => ".msi",
            Extension::Rar => ".rar",
            Extension::SevenZ => ".7z",
            Extension::Tar => ".tar",
            Extension::TarBz => ".tar.bz",
            Extension::TarBz2 => ".tar.bz2",
            Extension::TarGz => ".tar.gz",
            Extension::TarXz => ".tar.xz",
            Extension::TarZst => ".tar.zst",
            Extension::Tbz => ".tbz",
            Extension::Tgz => ".tgz",
            Extension::Txz => ".txz",
            Extension::Zip => ".zip",
        }
    }

    pub(crate) fn is_archive(self) -> bool {
        match self {
            Extension::AppImage
            | Extension::Deb
            | Extension::Dmg
            | Extension::Exe
            | Extension::Msi => false,
            Extension::Rar
            | Extension::SevenZ
            | Extension::Tar
            | Extension::TarBz
            | Extension::TarBz2
            | Extension::TarGz
            | Extension::TarXz
            | Extension::TarZst
            | Extension::Tbz
            | Extension::Tgz
            | Extension::Txz
            | Extension::Zip => true,
        }
    }

    /// Installer and package formats that only make sense on one OS. An asset with one of these
    /// extensions is considered a match for that OS even if its name doesn't mention the OS.
    pub(crate) fn exclusive_os(self) -> Option<Os> {
        match self {
            Extension::Exe | Extension::Msi => Some(Os::Windows),
            Extension::AppImage | Extension::Deb => Some(Os::Linux),
            Extension::Dmg => Some(Os::Darwin),
            Extension::Rar
            | Extension::SevenZ
            | Extension::Tar
            | Extension::TarBz
            | Extension::TarBz2
            | Extension::TarGz
            | Extension::TarXz
            | Extension::TarZst
            | Extension::Tbz
            | Extension::Tgz
            | Extension::Txz
            | Extension::Zip => None,
        }
    }

    pub(crate) fn from_path<P: AsRef<Path>>(path: P) -> Option<Extension> {
        let path_str = path.as_ref().to_string_lossy().to_lowercase();

        // We need to try the longest extensions first so that ".tar.gz" matches before ".gz" and so
        // on for other compression formats.
        Extension::iter()
            .sorted_by(|a, b| Ord::cmp(&a.extension().len(), &b.extension().len()))
            .rev()
            .find(|e| path_str.ends_with(e.extension()))
    }
}
