use crate::extension::Extension;
use anyhow::{anyhow, Context, Result};
use binstall_tar::Archive;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use log::debug;
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};
use tokio::process::Command;
use which::which;
use xz2::read::XzDecoder;
use zip::ZipArchive;

/// Unpacks `archive` into `dest`, which must already exist. Entries keep their paths relative to
/// `dest`. Entries that would land outside of `dest` are not written.
pub(crate) async fn extract(archive: &Path, ext: Extension, dest: &Path) -> Result<()> {
    debug!(
        "extracting {} into {}",
        archive.display(),
        dest.display()
    );
    match ext {
        Extension::Rar => extract_rar(archive, dest).await,
        Extension::SevenZ
        | Extension::Tar
        | Extension::TarBz
        | Extension::TarBz2
        | Extension::TarGz
        | Extension::TarXz
        | Extension::TarZst
        | Extension::Tbz
        | Extension::Tgz
        | Extension::Txz
        | Extension::Zip => {
            let archive = archive.to_path_buf();
            let dest = dest.to_path_buf();
            tokio::task::spawn_blocking(move || extract_native(&archive, ext, &dest))
                .await
                .context("the extraction task did not finish")?
        }
        Extension::AppImage | Extension::Deb | Extension::Dmg | Extension::Exe | Extension::Msi => {
            Err(anyhow!(
                "{} is not an archive that can be extracted",
                archive.display()
            ))
        }
    }
}

fn extract_native(archive: &Path, ext: Extension, dest: &Path) -> Result<()> {
    match ext {
        Extension::Zip => extract_zip(archive, dest),
        Extension::SevenZ => extract_7z(archive, dest),
        Extension::Tar
        | Extension::TarBz
        | Extension::TarBz2
        | Extension::TarGz
        | Extension::TarXz
        | Extension::TarZst
        | Extension::Tbz
        | Extension::Tgz
        | Extension::Txz => extract_tarball(archive, ext, dest),
        Extension::AppImage
        | Extension::Deb
        | Extension::Dmg
        | Extension::Exe
        | Extension::Msi
        | Extension::Rar => Err(anyhow!(
            "cannot extract {} without an external tool",
            archive.display()
        )),
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    debug!("extracting zip file");
    let mut zip = ZipArchive::new(open_file(archive)?)
        .with_context(|| format!("{} is not a valid zip file", archive.display()))?;
    zip.extract(dest)?;
    Ok(())
}

fn extract_tarball(archive: &Path, ext: Extension, dest: &Path) -> Result<()> {
    debug!("extracting tarball");
    let mut arch = tar_reader_for(archive, ext)?;
    arch.set_preserve_permissions(true);
    arch.unpack(dest)
        .with_context(|| format!("could not unpack the tarball {}", archive.display()))
}

fn extract_7z(archive: &Path, dest: &Path) -> Result<()> {
    debug!("extracting 7z file");
    sevenz_rust2::decompress_file(archive, dest)
        .map_err(|e| anyhow!("could not extract the 7z file {}: {e}", archive.display()))
}

async fn extract_rar(archive: &Path, dest: &Path) -> Result<()> {
    let mut cmd = if let Ok(unrar) = which("unrar") {
        let mut cmd = Command::new(unrar);
        cmd.arg("x").arg("-o+").arg("-y").arg(archive);
        // unrar treats a trailing separator as "extract into this directory".
        let mut dest_arg = dest.as_os_str().to_os_string();
        dest_arg.push(std::path::MAIN_SEPARATOR_STR);
        cmd.arg(dest_arg);
        cmd
    } else if let Some(seven_zip) = seven_zip_exe() {
        let mut cmd = Command::new(seven_zip);
        let mut out_arg = std::ffi::OsString::from("-o");
        out_arg.push(dest.as_os_str());
        cmd.arg("x").arg("-y").arg(out_arg).arg(archive);
        cmd
    } else {
        return Err(anyhow!(
            "extracting {} needs `unrar` or `7z` in your PATH",
            archive.display()
        ));
    };

    debug!("running {cmd:?}");
    let output = cmd
        .output()
        .await
        .with_context(|| format!("could not run {cmd:?}"))?;
    if !output.status.success() {
        return Err(anyhow!(
            "{cmd:?} failed with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim(),
        ));
    }
    Ok(())
}

fn seven_zip_exe() -> Option<PathBuf> {
    ["7z", "7za"].into_iter().find_map(|n| which(n).ok())
}

fn tar_reader_for(archive: &Path, ext: Extension) -> Result<Archive<Box<dyn Read>>> {
    let file = open_file(archive)?;
    let reader: Box<dyn Read> = match ext {
        Extension::Tar => Box::new(file),
        Extension::TarBz | Extension::TarBz2 | Extension::Tbz => Box::new(BzDecoder::new(file)),
        Extension::TarGz | Extension::Tgz => Box::new(GzDecoder::new(file)),
        Extension::TarXz | Extension::Txz => Box::new(XzDecoder::new(file)),
        Extension::TarZst => Box::new(zstd::stream::read::Decoder::new(file)?),
        Extension::AppImage
        | Extension::Deb
        | Extension::Dmg
        | Extension::Exe
        | Extension::Msi
        | Extension::Rar
        | Extension::SevenZ
        | Extension::Zip => {
            return Err(anyhow!(
                "{} is not a tarball",
                archive.display()
            ))
        }
    };
    Ok(Archive::new(reader))
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open file at {}", path.to_string_lossy()))
}
