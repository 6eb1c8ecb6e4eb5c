//! Zip packaging for directory downloads.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use pyide_error::IdeError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::workspace::IGNORED_NAMES;

/// Deflated archive of everything under `dir`, with entry names relative to `dir`.
pub fn zip_directory(dir: &Path) -> Result<Vec<u8>, IdeError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    add_directory(&mut writer, dir, "", options)?;
    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

fn add_directory(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    dir: &Path,
    prefix: &str,
    options: FileOptions,
) -> Result<(), IdeError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|err| IdeError::from_io(dir, err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| IdeError::from_io(dir, err))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if IGNORED_NAMES.contains(&name.as_str()) {
            continue;
        }
        let path = entry.path();
        let archive_name = format!("{prefix}{name}");
        let file_type = entry
            .file_type()
            .map_err(|err| IdeError::from_io(&path, err))?;
        if file_type.is_dir() {
            writer
                .add_directory(format!("{archive_name}/"), options)
                .map_err(zip_error)?;
            add_directory(writer, &path, &format!("{archive_name}/"), options)?;
        } else if file_type.is_file() {
            let bytes = fs::read(&path).map_err(|err| IdeError::from_io(&path, err))?;
            writer
                .start_file(archive_name, options)
                .map_err(zip_error)?;
            writer.write_all(&bytes)?;
        }
    }
    Ok(())
}

fn zip_error(err: zip::result::ZipError) -> IdeError {
    IdeError::Io {
        message: format!("failed to build zip archive: {err}"),
    }
}
