//! Zip container encoding for backup archives.
//!
//! Layout:
//!
//! ```text
//! user-data/profile-and-credentials.json
//! database/dump.json
//! images/<filename>
//! README.md
//! ```

use std::io::{Cursor, Read, Seek, Write};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use super::bundle::{
    CachedImage, DatabaseDump, DecodedArchive, ExportBundle, UserDataDocument, DUMP_PATH,
    IMAGES_PREFIX, README_PATH, USER_DATA_PATH,
};
use crate::file_safety::sanitize_image_filename;
use crate::{Error, Result};

/// Deflate level used for archives. Exports are cold, so favour size.
const COMPRESSION_LEVEL: i32 = 9;

/// Largest decompressed image entry accepted on import.
pub const MAX_IMAGE_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

fn zip_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
}

fn write_failed(path: &str, e: impl std::fmt::Display) -> Error {
    Error::Internal(format!("Failed to write archive entry {}: {}", path, e))
}

/// Encode a bundle into zip bytes.
///
/// JSON documents are serialized straight into the compressor; image bytes are
/// copied entry by entry.
pub fn write_archive(bundle: &ExportBundle) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    write_archive_to(&mut buffer, bundle, Utc::now())?;
    Ok(buffer.into_inner())
}

/// Encode a bundle into any seekable writer.
pub fn write_archive_to<W: Write + Seek>(
    writer: W,
    bundle: &ExportBundle,
    created_at: DateTime<Utc>,
) -> Result<()> {
    let mut zip = ZipWriter::new(writer);
    let options = zip_options();

    zip.start_file(USER_DATA_PATH, options)
        .map_err(|e| write_failed(USER_DATA_PATH, e))?;
    serde_json::to_writer_pretty(&mut zip, &bundle.user_data)?;

    zip.start_file(DUMP_PATH, options)
        .map_err(|e| write_failed(DUMP_PATH, e))?;
    serde_json::to_writer_pretty(&mut zip, &bundle.dump)?;

    let mut written = 0usize;
    for image in &bundle.images {
        let Some(name) = sanitize_image_filename(&image.filename) else {
            warn!(
                subsystem = "backup",
                component = "codec",
                filename = %image.filename,
                "Skipping image with unusable filename"
            );
            continue;
        };
        let path = format!("{}{}", IMAGES_PREFIX, name);
        zip.start_file(path.as_str(), options)
            .map_err(|e| write_failed(&path, e))?;
        zip.write_all(&image.bytes)
            .map_err(|e| write_failed(&path, e))?;
        written += 1;
    }

    zip.start_file(README_PATH, options)
        .map_err(|e| write_failed(README_PATH, e))?;
    zip.write_all(readme(bundle.dump.metadata.user_id, created_at).as_bytes())
        .map_err(|e| write_failed(README_PATH, e))?;

    zip.finish()
        .map_err(|e| Error::Internal(format!("Failed to finalize archive: {}", e)))?;

    debug!(
        subsystem = "backup",
        component = "codec",
        op = "write",
        images = written,
        "Archive written"
    );
    Ok(())
}

fn readme(user_id: i64, created_at: DateTime<Utc>) -> String {
    format!(
        "# BackLogus Backup\n\
         \n\
         Created: {created}\n\
         User ID: {user_id}\n\
         \n\
         ## Structure\n\
         - user-data/profile-and-credentials.json - User profile and API credentials\n\
         - database/dump.json - Library entries, catalog items and export metadata\n\
         - images/ - Cached media images\n\
         - README.md - This file\n\
         \n\
         ## Restore\n\
         Use \"Import Backup\" in BackLogus Settings to restore this backup.\n\
         All data is linked to the user performing the restore. Your password is not\n\
         included, and your account email is never changed by an import.\n\
         \n\
         Integers are written as plain JSON numbers. Readers that parse numbers as\n\
         doubles lose precision above 9007199254740991.\n",
        created = created_at.to_rfc3339(),
        user_id = user_id,
    )
}

/// Decode zip bytes into a [`DecodedArchive`].
///
/// Entries are read one at a time. Both JSON documents must be present;
/// anything outside the known layout is ignored. Declared entry sizes are not
/// trusted; image entries larger than [`MAX_IMAGE_ENTRY_BYTES`] once
/// decompressed make the archive corrupt.
pub fn read_archive(bytes: &[u8]) -> Result<DecodedArchive> {
    read_archive_with_limit(bytes, MAX_IMAGE_ENTRY_BYTES)
}

fn read_archive_with_limit(bytes: &[u8], max_image_bytes: u64) -> Result<DecodedArchive> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::InvalidFormat(format!("Invalid ZIP file format: {}", e)))?;

    let mut user_data: Option<UserDataDocument> = None;
    let mut dump: Option<DatabaseDump> = None;
    let mut images = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::corrupt(format!("entry #{}", i), e))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        if name == USER_DATA_PATH {
            user_data = Some(read_document(&mut entry, &name)?);
        } else if name == DUMP_PATH {
            dump = Some(read_document(&mut entry, &name)?);
        } else if let Some(raw) = name.strip_prefix(IMAGES_PREFIX) {
            let Some(filename) = sanitize_image_filename(raw) else {
                debug!(
                    subsystem = "backup",
                    component = "codec",
                    entry = %name,
                    "Skipping image entry without usable filename"
                );
                continue;
            };
            let mut data = Vec::new();
            entry
                .by_ref()
                .take(max_image_bytes + 1)
                .read_to_end(&mut data)
                .map_err(|e| Error::corrupt(&name, e))?;
            if data.len() as u64 > max_image_bytes {
                return Err(Error::corrupt(
                    &name,
                    format!("image entry exceeds {} bytes", max_image_bytes),
                ));
            }
            images.push(CachedImage {
                filename,
                bytes: data,
            });
        }
    }

    let user_data = user_data.ok_or_else(|| Error::corrupt(USER_DATA_PATH, "missing entry"))?;
    let dump = dump.ok_or_else(|| Error::corrupt(DUMP_PATH, "missing entry"))?;

    Ok(DecodedArchive {
        user_data,
        dump,
        images,
    })
}

fn read_document<T: serde::de::DeserializeOwned>(entry: &mut impl Read, path: &str) -> Result<T> {
    let mut raw = Vec::new();
    entry
        .read_to_end(&mut raw)
        .map_err(|e| Error::corrupt(path, e))?;
    serde_json::from_slice(&raw).map_err(|e| Error::corrupt(path, e))
}
