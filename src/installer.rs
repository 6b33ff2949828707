//! Atomic download-and-install of release assets.
//!
//! The install pipeline never exposes a half-written artifact: the asset
//! body streams into a random-suffix temp file inside the install
//! directory, the payload is staged (decompressed) into a second temp file
//! in the same directory, and the staged file is renamed onto the final
//! path. Rename within one directory is atomic on the target filesystems,
//! so any failure up to that point leaves the previously installed
//! artifact untouched. Temp files are cleaned up on drop.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use flate2::read::GzDecoder;
use tempfile::NamedTempFile;

use crate::assets::SelectedAsset;
use crate::config::Packaging;
use crate::error::{Result, UpdateError};
use crate::registry::RegistryClient;

/// Per-chunk download progress: bytes received so far and the total from
/// the `Content-Length` header when the server sent one.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, Option<u64>);

const CHUNK_SIZE: usize = 64 * 1024;

/// Download `asset` and atomically install it into `install_dir`.
///
/// On success the artifact is complete and (for the server family)
/// executable at its final path. On failure nothing observable has
/// changed. Recording the installed tag is the coordinator's job.
pub fn install(
    client: &RegistryClient,
    asset: &SelectedAsset,
    install_dir: &Path,
    progress: ProgressFn,
) -> Result<()> {
    fs::create_dir_all(install_dir)?;
    let final_path = install_dir.join(&asset.install_name);

    let mut download = temp_in(install_dir, &asset.install_name, ".download")?;
    stream_to(client, &asset.download_url, download.as_file_mut(), progress)?;

    let staged = stage_payload(&mut download, asset, install_dir)?;

    #[cfg(unix)]
    if asset.family.is_executable() {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o755))?;
    }

    // Windows cannot rename over a running executable; remove first and
    // classify a lock as the dedicated busy failure.
    if let Err(err) = fs::remove_file(&final_path) {
        if err.kind() != io::ErrorKind::NotFound {
            return Err(classify_io(err, &final_path));
        }
    }

    staged
        .persist(&final_path)
        .map_err(|err| classify_io(err.error, &final_path))?;
    tracing::info!(
        "installed {} {} at {}",
        asset.family.label(),
        asset.tag,
        final_path.display()
    );

    if asset.family.is_executable() && needs_interpreter_patch() {
        if let Err(err) = patch_interpreter(&final_path, &asset.install_name) {
            // The unpatched binary may still run, or fail at spawn time;
            // either way the install itself is complete.
            tracing::warn!("interpreter patch failed: {err}");
        }
    }

    Ok(())
}

fn temp_in(dir: &Path, name: &str, suffix: &str) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!("{name}."))
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(UpdateError::Io)
}

/// Stream the asset body into `dest`, reporting progress per chunk.
fn stream_to(
    client: &RegistryClient,
    url: &str,
    dest: &mut fs::File,
    progress: ProgressFn,
) -> Result<()> {
    let mut response = client.download(url)?;
    let total = response.content_length();

    let mut received: u64 = 0;
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = response.read(&mut buf)?;
        if n == 0 {
            break;
        }
        dest.write_all(&buf[..n])?;
        received += n as u64;
        progress(received, total);
    }
    dest.flush()?;
    Ok(())
}

/// Turn the downloaded temp file into the staged payload ready to rename.
fn stage_payload(
    download: &mut NamedTempFile,
    asset: &SelectedAsset,
    install_dir: &Path,
) -> Result<NamedTempFile> {
    download.as_file_mut().seek(SeekFrom::Start(0))?;
    let mut staged = temp_in(install_dir, &asset.install_name, ".staged")?;

    match asset.packaging {
        Packaging::Gzip => {
            let mut decoder = GzDecoder::new(download.as_file());
            io::copy(&mut decoder, staged.as_file_mut())?;
        }
        Packaging::Zip => {
            extract_zip_payload(download.reopen()?, &asset.install_name, staged.as_file_mut())?;
        }
    }

    staged.as_file_mut().flush()?;
    Ok(staged)
}

/// Copy the archive's payload into `staged`: the entry named like the
/// install target, or the first file entry when the archive uses a
/// different internal name.
fn extract_zip_payload(file: fs::File, install_name: &str, staged: &mut fs::File) -> Result<()> {
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| io::Error::other(format!("unreadable zip asset: {err}")))?;

    let index = (0..archive.len())
        .find(|&i| {
            archive
                .by_index(i)
                .map(|entry| entry.is_file() && entry.name() == install_name)
                .unwrap_or(false)
        })
        .or_else(|| {
            (0..archive.len()).find(|&i| {
                archive
                    .by_index(i)
                    .map(|entry| entry.is_file())
                    .unwrap_or(false)
            })
        })
        .ok_or_else(|| UpdateError::Io(io::Error::other("zip asset contains no file entry")))?;

    let mut entry = archive
        .by_index(index)
        .map_err(|err| io::Error::other(format!("corrupt zip entry: {err}")))?;
    io::copy(&mut entry, staged)?;
    Ok(())
}

fn classify_io(err: io::Error, path: &Path) -> UpdateError {
    if is_busy_error(&err) {
        UpdateError::ResourceBusy {
            path: path.to_path_buf(),
        }
    } else {
        UpdateError::Io(err)
    }
}

#[cfg(unix)]
fn is_busy_error(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == libc::EBUSY || code == libc::ETXTBSY || code == libc::EPERM
    )
}

#[cfg(windows)]
fn is_busy_error(err: &io::Error) -> bool {
    // ERROR_ACCESS_DENIED and ERROR_SHARING_VIOLATION: the image is loaded
    // by a running process.
    matches!(err.raw_os_error(), Some(5) | Some(32))
}

#[cfg(not(any(unix, windows)))]
fn is_busy_error(_err: &io::Error) -> bool {
    false
}

/// NixOS keeps its dynamic linker outside the FHS paths, so downloaded
/// binaries need their ELF interpreter rewritten before they can run.
fn needs_interpreter_patch() -> bool {
    Path::new("/etc/nixos").exists()
}

/// Rewrite the binary's interpreter via `nix-build` + patchelf.
fn patch_interpreter(dest: &Path, name: &str) -> Result<()> {
    let expression = format!(
        r#"{{src, pkgs ? import <nixpkgs> {{}}}}:
    pkgs.stdenv.mkDerivation {{
        name = "{name}";
        inherit src;
        phases = [ "installPhase" "fixupPhase" ];
        installPhase = "cp $src $out";
        fixupPhase = ''
        chmod 755 $out
        patchelf --set-interpreter "$(cat $NIX_CC/nix-support/dynamic-linker)" $out
        '';
    }}
"#
    );

    let orig: PathBuf = {
        let mut orig = dest.as_os_str().to_owned();
        orig.push("-orig");
        orig.into()
    };
    fs::rename(dest, &orig)?;

    let run = || -> Result<()> {
        let mut child = Command::new("nix-build")
            .arg("-E")
            .arg("-")
            .arg("--arg")
            .arg("src")
            .arg(&orig)
            .arg("-o")
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(expression.as_bytes())?;
        }
        drop(child.stdin.take());

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(UpdateError::PatchFailed {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    };

    let result = run();
    if result.is_err() {
        // Put the unpatched binary back so a failed patch still leaves a
        // runnable-or-diagnosable artifact at the install path.
        let _ = fs::rename(&orig, dest);
    } else {
        let _ = fs::remove_file(&orig);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{select_asset, ArtifactFamily};
    use crate::config::ServerSpec;
    use crate::platform::{resolve_with, LibcFlavor};
    use crate::registry::{AssetDescriptor, ReleaseMetadata};
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn spec() -> ServerSpec {
        let mut spec = ServerSpec::new("iamcco", "ds-pinyin-lsp", "ds-pinyin-lsp", "dict.db3");
        spec.server_packaging = Packaging::Gzip;
        spec
    }

    fn platform() -> crate::platform::PlatformId {
        resolve_with("x86_64", "linux", || LibcFlavor::Glibc).unwrap()
    }

    fn gzip_bytes(payload: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn zip_bytes(entry_name: &str, payload: &[u8]) -> Vec<u8> {
        let mut cursor = io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file(entry_name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(payload).unwrap();
        writer.finish().unwrap();
        cursor.into_inner()
    }

    fn selected(server: &MockServer, spec: &ServerSpec, family: ArtifactFamily, asset_path: &str) -> SelectedAsset {
        let ext = family.packaging(spec).extension();
        let name = match family {
            ArtifactFamily::Server => format!("ds-pinyin-lsp-{}.{ext}", platform()),
            ArtifactFamily::Dictionary => format!("{}.{ext}", spec.dictionary_name),
        };
        let release = ReleaseMetadata {
            tag_name: "v1.2.0".to_string(),
            published_at: None,
            assets: vec![AssetDescriptor {
                name,
                browser_download_url: server.url(asset_path),
            }],
        };
        select_asset(&release, Some(platform()), family, spec).unwrap()
    }

    fn client(spec: &ServerSpec) -> RegistryClient {
        RegistryClient::new(spec).unwrap()
    }

    #[test]
    fn installs_gzip_server_asset() {
        let server = MockServer::start();
        let payload = b"#!/bin/sh\necho server\n";
        server.mock(|when, then| {
            when.method(GET).path("/server.gz");
            then.status(200).body(gzip_bytes(payload));
        });

        let spec = spec();
        let temp = TempDir::new().unwrap();
        let asset = selected(&server, &spec, ArtifactFamily::Server, "/server.gz");

        let mut seen: Vec<(u64, Option<u64>)> = Vec::new();
        install(&client(&spec), &asset, temp.path(), &mut |cur, total| {
            seen.push((cur, total))
        })
        .unwrap();

        let installed = temp.path().join(&asset.install_name);
        assert_eq!(fs::read(&installed).unwrap(), payload);
        assert!(!seen.is_empty());
        let (last, total) = *seen.last().unwrap();
        assert_eq!(Some(last), total);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&installed).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0, "server binary must be executable");
        }
    }

    #[test]
    fn installs_zip_dictionary_asset() {
        let server = MockServer::start();
        let payload = b"dictionary-bytes";
        server.mock(|when, then| {
            when.method(GET).path("/dict.db3.zip");
            then.status(200).body(zip_bytes("dict.db3", payload));
        });

        let spec = spec();
        let temp = TempDir::new().unwrap();
        let asset = selected(&server, &spec, ArtifactFamily::Dictionary, "/dict.db3.zip");

        install(&client(&spec), &asset, temp.path(), &mut |_, _| {}).unwrap();
        assert_eq!(fs::read(temp.path().join("dict.db3")).unwrap(), payload);
    }

    #[test]
    fn zip_with_foreign_entry_name_still_installs() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/dict.db3.zip");
            then.status(200).body(zip_bytes("data/some-other-name", b"payload"));
        });

        let spec = spec();
        let temp = TempDir::new().unwrap();
        let asset = selected(&server, &spec, ArtifactFamily::Dictionary, "/dict.db3.zip");

        install(&client(&spec), &asset, temp.path(), &mut |_, _| {}).unwrap();
        assert_eq!(
            fs::read(temp.path().join("dict.db3")).unwrap(),
            b"payload"
        );
    }

    #[test]
    fn reinstalling_same_asset_is_idempotent() {
        let server = MockServer::start();
        let payload = b"stable-payload";
        server.mock(|when, then| {
            when.method(GET).path("/dict.db3.zip");
            then.status(200).body(zip_bytes("dict.db3", payload));
        });

        let spec = spec();
        let temp = TempDir::new().unwrap();
        let asset = selected(&server, &spec, ArtifactFamily::Dictionary, "/dict.db3.zip");

        install(&client(&spec), &asset, temp.path(), &mut |_, _| {}).unwrap();
        let first = fs::read(temp.path().join("dict.db3")).unwrap();
        install(&client(&spec), &asset, temp.path(), &mut |_, _| {}).unwrap();
        let second = fs::read(temp.path().join("dict.db3")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn failed_install_leaves_previous_artifact_intact() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/server.gz");
            then.status(200).body(b"this is not gzip data".to_vec());
        });

        let spec = spec();
        let temp = TempDir::new().unwrap();
        let asset = selected(&server, &spec, ArtifactFamily::Server, "/server.gz");

        let final_path = temp.path().join(&asset.install_name);
        fs::write(&final_path, b"previous working binary").unwrap();

        let err = install(&client(&spec), &asset, temp.path(), &mut |_, _| {}).unwrap_err();
        assert!(matches!(err, UpdateError::Io(_)), "got {err:?}");

        assert_eq!(fs::read(&final_path).unwrap(), b"previous working binary");
    }

    #[test]
    fn no_temp_files_remain_after_install_or_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/dict.db3.zip");
            then.status(200).body(zip_bytes("dict.db3", b"payload"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/bad.gz");
            then.status(200).body(b"garbage".to_vec());
        });

        let spec = spec();
        let temp = TempDir::new().unwrap();

        let good = selected(&server, &spec, ArtifactFamily::Dictionary, "/dict.db3.zip");
        install(&client(&spec), &good, temp.path(), &mut |_, _| {}).unwrap();

        let bad = selected(&server, &spec, ArtifactFamily::Server, "/bad.gz");
        let _ = install(&client(&spec), &bad, temp.path(), &mut |_, _| {}).unwrap_err();

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".download") || name.contains(".staged"))
            .collect();
        assert!(leftovers.is_empty(), "temp debris: {leftovers:?}");
    }

    #[test]
    fn download_error_status_is_typed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone.gz");
            then.status(404);
        });

        let spec = spec();
        let temp = TempDir::new().unwrap();
        let asset = selected(&server, &spec, ArtifactFamily::Server, "/gone.gz");

        let err = install(&client(&spec), &asset, temp.path(), &mut |_, _| {}).unwrap_err();
        assert!(matches!(err, UpdateError::Download { status: 404, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn busy_errnos_classify_as_resource_busy() {
        for code in [libc::EBUSY, libc::ETXTBSY, libc::EPERM] {
            let err = io::Error::from_raw_os_error(code);
            assert!(is_busy_error(&err), "errno {code} should classify busy");
        }
        assert!(!is_busy_error(&io::Error::from_raw_os_error(libc::ENOENT)));
    }

    #[test]
    fn classify_io_maps_busy_to_resource_busy() {
        #[cfg(unix)]
        {
            let err = classify_io(
                io::Error::from_raw_os_error(libc::ETXTBSY),
                Path::new("/opt/plugin/server"),
            );
            assert!(err.is_busy());
        }

        let err = classify_io(io::Error::other("disk on fire"), Path::new("/x"));
        assert!(!err.is_busy());
    }
}
