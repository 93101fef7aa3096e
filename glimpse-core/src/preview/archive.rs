//! Archive member listing: ZIP, RAR and TAR (plain, gzip, bzip2 or xz).

use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tracing::{debug, instrument};
use xz2::read::XzDecoder;
use zip::ZipArchive;

use super::{mime::sniff_magic, ticket::Ticket};
use crate::error::{CoreError, CoreResult};

#[async_trait]
pub trait ArchiveLister: Send + Sync {
    /// File member names in archive order; directories are skipped.
    ///
    /// Fails with [`CoreError::Archive`] on corrupt or unsupported archives.
    async fn list(&self, path: &Path, ticket: &Ticket) -> CoreResult<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    Rar,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalArchiveLister;

impl LocalArchiveLister {
    fn detect_format(path: &Path, file: &mut File) -> CoreResult<ArchiveFormat> {
        let mut head = [0u8; 512];
        let read = read_up_to(file, &mut head)?;
        file.seek(SeekFrom::Start(0))?;

        match sniff_magic(&head[..read]) {
            Some("application/zip") => return Ok(ArchiveFormat::Zip),
            Some("application/x-rar") => return Ok(ArchiveFormat::Rar),
            Some("application/gzip") => return Ok(ArchiveFormat::TarGz),
            Some("application/x-bzip2") => return Ok(ArchiveFormat::TarBz2),
            Some("application/x-xz") => return Ok(ArchiveFormat::TarXz),
            Some("application/x-tar") => return Ok(ArchiveFormat::Tar),
            _ => {}
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if ends_with_any(&name, &[".zip", ".jar"]) {
            Ok(ArchiveFormat::Zip)
        } else if ends_with_any(&name, &[".rar"]) {
            Ok(ArchiveFormat::Rar)
        } else if ends_with_any(&name, &[".tar.gz", ".tgz"]) {
            Ok(ArchiveFormat::TarGz)
        } else if ends_with_any(&name, &[".tar.bz2", ".tbz2", ".tbz"]) {
            Ok(ArchiveFormat::TarBz2)
        } else if ends_with_any(&name, &[".tar.xz", ".txz"]) {
            Ok(ArchiveFormat::TarXz)
        } else if ends_with_any(&name, &[".tar"]) {
            Ok(ArchiveFormat::Tar)
        } else {
            Err(CoreError::archive(path, "unsupported archive format"))
        }
    }

    fn list_blocking(path: &Path, ticket: &Ticket) -> CoreResult<Vec<String>> {
        let mut file = File::open(path).map_err(|e| CoreError::archive(path, e))?;
        let format = Self::detect_format(path, &mut file)?;
        debug!(?format, "opening archive");

        match format {
            ArchiveFormat::Zip => list_zip(path, file, ticket),
            ArchiveFormat::Rar => list_rar(path, ticket),
            ArchiveFormat::Tar => list_tar(path, BufReader::new(file), ticket),
            ArchiveFormat::TarGz => list_tar(path, GzDecoder::new(BufReader::new(file)), ticket),
            ArchiveFormat::TarBz2 => list_tar(path, BzDecoder::new(BufReader::new(file)), ticket),
            ArchiveFormat::TarXz => list_tar(path, XzDecoder::new(BufReader::new(file)), ticket),
        }
    }
}

#[async_trait]
impl ArchiveLister for LocalArchiveLister {
    #[instrument(level = "debug", skip(self, ticket), fields(generation = ticket.generation()))]
    async fn list(&self, path: &Path, ticket: &Ticket) -> CoreResult<Vec<String>> {
        let owned: PathBuf = path.to_path_buf();
        let ticket = ticket.clone();

        tokio::task::spawn_blocking(move || Self::list_blocking(&owned, &ticket)).await?
    }
}

fn ends_with_any(name: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|suffix| name.ends_with(suffix))
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn list_zip(path: &Path, file: File, ticket: &Ticket) -> CoreResult<Vec<String>> {
    let mut archive = ZipArchive::new(file).map_err(|e| CoreError::archive(path, e))?;
    let mut members = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        ticket.checkpoint()?;

        let entry = archive.by_index(i).map_err(|e| CoreError::archive(path, e))?;
        if !entry.is_dir() {
            members.push(entry.name().to_string());
        }
    }

    Ok(members)
}

/// unrar reads from the path itself.
fn list_rar(path: &Path, ticket: &Ticket) -> CoreResult<Vec<String>> {
    let archive = unrar::Archive::new(path)
        .open_for_listing()
        .map_err(|e| CoreError::archive(path, e))?;
    let mut members = Vec::new();

    for header in archive {
        ticket.checkpoint()?;

        let header = header.map_err(|e| CoreError::archive(path, e))?;
        if !header.is_directory() {
            members.push(header.filename.to_string_lossy().replace('\\', "/"));
        }
    }

    Ok(members)
}

fn list_tar<R: Read>(path: &Path, reader: R, ticket: &Ticket) -> CoreResult<Vec<String>> {
    let mut archive = tar::Archive::new(reader);
    let mut members = Vec::new();

    let entries = archive.entries().map_err(|e| CoreError::archive(path, e))?;
    for entry in entries {
        ticket.checkpoint()?;

        let entry = entry.map_err(|e| CoreError::archive(path, e))?;
        if entry.header().entry_type().is_dir() {
            continue;
        }

        let name = entry.path().map_err(|e| CoreError::archive(path, e))?;
        let name = name.to_string_lossy().replace('\\', "/");
        if !name.ends_with('/') {
            members.push(name);
        }
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::ticket::GenerationCounter;
    use std::io::Write;

    fn current_ticket() -> Ticket {
        let counter = GenerationCounter::new();
        counter.ticket(counter.advance())
    }

    fn write_zip(path: &Path) {
        let file = File::create(path).expect("create");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();

        zip.add_directory("docs/", options).expect("dir");
        zip.start_file("docs/readme.md", options).expect("file");
        zip.write_all(b"# hi").expect("write");
        zip.start_file("main.rs", options).expect("file");
        zip.write_all(b"fn main() {}").expect("write");
        zip.finish().expect("finish");
    }

    /// One-member tar written through `writer`, which is handed back for finishing.
    fn write_tar<W: Write>(writer: W) -> W {
        let mut builder = tar::Builder::new(writer);

        let data = b"hello";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "src/lib.rs", &data[..])
            .expect("append");
        builder.into_inner().expect("tar")
    }

    fn write_tar_gz(path: &Path) {
        let file = File::create(path).expect("create");
        write_tar(flate2::write::GzEncoder::new(file, flate2::Compression::default()))
            .finish()
            .expect("gz");
    }

    #[tokio::test]
    async fn test_zip_members_skip_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bundle.zip");
        write_zip(&path);

        let members = LocalArchiveLister
            .list(&path, &current_ticket())
            .await
            .expect("list");

        assert_eq!(members, vec!["docs/readme.md", "main.rs"]);
    }

    #[tokio::test]
    async fn test_tar_gz_members() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("src.tar.gz");
        write_tar_gz(&path);

        let members = LocalArchiveLister
            .list(&path, &current_ticket())
            .await
            .expect("list");

        assert_eq!(members, vec!["src/lib.rs"]);
    }

    #[tokio::test]
    async fn test_tar_bz2_and_tar_xz_members() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bz2 = dir.path().join("src.tar.bz2");
        let xz = dir.path().join("src.tar.xz");

        write_tar(bzip2::write::BzEncoder::new(
            File::create(&bz2).expect("create"),
            bzip2::Compression::default(),
        ))
        .finish()
        .expect("bz2");
        write_tar(xz2::write::XzEncoder::new(File::create(&xz).expect("create"), 6))
            .finish()
            .expect("xz");

        for path in [bz2, xz] {
            let members = LocalArchiveLister
                .list(&path, &current_ticket())
                .await
                .expect("list");

            assert_eq!(members, vec!["src/lib.rs"], "{}", path.display());
        }
    }

    #[tokio::test]
    async fn test_compressed_tar_detected_by_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("download");
        write_tar(xz2::write::XzEncoder::new(File::create(&path).expect("create"), 6))
            .finish()
            .expect("xz");

        let members = LocalArchiveLister
            .list(&path, &current_ticket())
            .await
            .expect("list");

        assert_eq!(members, vec!["src/lib.rs"]);
    }

    #[test]
    fn test_rar_detected_by_magic_and_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let magic = dir.path().join("mystery");
        let named = dir.path().join("bundle.RAR");
        std::fs::write(&magic, b"Rar!\x1a\x07\x01\x00").expect("write");
        std::fs::write(&named, b"not much").expect("write");

        for path in [magic, named] {
            let mut file = File::open(&path).expect("open");
            assert_eq!(
                LocalArchiveLister::detect_format(&path, &mut file).expect("format"),
                ArchiveFormat::Rar
            );
        }
    }

    #[tokio::test]
    async fn test_corrupt_rar_is_archive_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.rar");
        std::fs::write(&path, b"plain words, no archive here").expect("write");

        let err = LocalArchiveLister
            .list(&path, &current_ticket())
            .await
            .expect_err("corrupt");

        assert!(matches!(err, CoreError::Archive { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_zip_is_archive_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"PK\x03\x04 this is not really a zip").expect("write");

        let err = LocalArchiveLister
            .list(&path, &current_ticket())
            .await
            .expect_err("corrupt");

        assert!(matches!(err, CoreError::Archive { .. }));
    }

    #[tokio::test]
    async fn test_superseded_listing_stops() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bundle.zip");
        write_zip(&path);

        let counter = GenerationCounter::new();
        let stale = counter.ticket(counter.advance());
        counter.advance();

        let err = LocalArchiveLister
            .list(&path, &stale)
            .await
            .expect_err("stale");

        assert!(err.is_superseded());
    }
}
