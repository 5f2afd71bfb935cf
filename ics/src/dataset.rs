//! The dataset handle: open/close lifecycle, mode-string parsing, and
//! the header-rewrite transaction for update mode.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ics_core::codec::BodyRead;
use ics_core::error::{IcsError, IcsResult};
use ics_core::format::{Compression, FileMode, Version};

use crate::header::Header;

/// Default gzip effort when the caller never picked one.
const DEFAULT_GZIP_LEVEL: u32 = 6;

/// An open ICS dataset.
///
/// The lifetime parameter ties the handle to the sample buffer attached
/// with [`set_data`](Ics::set_data): the buffer is borrowed, never
/// copied, and must stay alive until [`close`](Ics::close) writes it
/// out.
pub struct Ics<'buf> {
    pub(crate) header: Header,
    pub(crate) mode: FileMode,
    /// Path of the `.ics` file itself.
    pub(crate) path: PathBuf,
    pub(crate) compression_level: u32,
    /// Attached source buffer for the pending write, with optional
    /// per-dimension element strides.
    pub(crate) data: Option<&'buf [u8]>,
    pub(crate) data_strides: Option<Vec<usize>>,
    /// Byte offset of the embedded body inside the `.ics` file, for
    /// version-2 datasets opened for reading or update.
    pub(crate) data_offset: u64,
    /// Body stream of an in-flight block read.
    pub(crate) read_state: Option<Box<dyn BodyRead>>,
}

/// Decoded open-mode string.
#[derive(Debug)]
struct ModeFlags {
    read: bool,
    write: bool,
    force_name: bool,
    /// The historical "don't force the C locale" bit. Number formatting
    /// here never depends on the process locale, so this is recorded
    /// and otherwise inert.
    #[allow(dead_code)]
    native_locale: bool,
    version: Option<Version>,
}

fn parse_mode(mode: &str) -> IcsResult<ModeFlags> {
    let mut flags = ModeFlags {
        read: false,
        write: false,
        force_name: false,
        native_locale: false,
        version: None,
    };
    for c in mode.chars() {
        let slot = match c {
            'r' => &mut flags.read,
            'w' => &mut flags.write,
            'f' => &mut flags.force_name,
            'l' => &mut flags.native_locale,
            '1' | '2' => {
                if flags.version.is_some() {
                    return Err(IcsError::IllParameter);
                }
                flags.version = Some(if c == '1' { Version::V1 } else { Version::V2 });
                continue;
            }
            _ => return Err(IcsError::IllParameter),
        };
        if *slot {
            return Err(IcsError::IllParameter);
        }
        *slot = true;
    }
    if !flags.read && !flags.write {
        return Err(IcsError::IllParameter);
    }
    Ok(flags)
}

/// Append `.tmp` to a full file name (extension included).
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

impl<'buf> Ics<'buf> {
    /// Open a dataset. `mode` is a string of one-character flags:
    ///
    /// | char | effect |
    /// |------|--------|
    /// | `r`  | read |
    /// | `w`  | write |
    /// | `f`  | use `path` verbatim, no `.ics` suffix synthesis |
    /// | `l`  | don't force the C locale for header numbers |
    /// | `1`  | write format version 1 |
    /// | `2`  | write format version 2 |
    ///
    /// `r` plus `w` opens an existing file for update: metadata setters
    /// work, and close rewrites the header while preserving the body.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> IcsResult<Ics<'buf>> {
        let flags = parse_mode(mode)?;
        let mut path = path.as_ref().to_path_buf();
        if !flags.force_name {
            path.set_extension("ics");
        }

        let file_mode = match (flags.read, flags.write) {
            (true, true) => FileMode::Update,
            (true, false) => FileMode::Read,
            _ => FileMode::Write,
        };

        let mut dataset = Ics {
            header: Header::default(),
            mode: file_mode,
            path,
            compression_level: DEFAULT_GZIP_LEVEL,
            data: None,
            data_strides: None,
            data_offset: 0,
            read_state: None,
        };

        match file_mode {
            FileMode::Read | FileMode::Update => {
                let mut file = File::open(&dataset.path).map_err(|_| IcsError::FOpenIcs)?;
                let (header, offset) = Header::parse(&mut file)?;
                dataset.header = header;
                dataset.data_offset = offset;
            }
            FileMode::Write => {
                dataset.header.version = flags.version.unwrap_or_default();
                dataset.header.filename = dataset
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
        }
        Ok(dataset)
    }

    pub fn file_mode(&self) -> FileMode {
        self.mode
    }

    pub fn version(&self) -> Version {
        self.header.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sidecar binary file of a version-1 dataset.
    pub(crate) fn ids_path(&self) -> PathBuf {
        self.path.with_extension("ids")
    }

    pub(crate) fn require_mode(&self, allowed: &[FileMode]) -> IcsResult {
        if allowed.contains(&self.mode) {
            Ok(())
        } else {
            Err(IcsError::NotValidAction)
        }
    }

    /// Close the dataset. Read mode finalizes any in-flight body stream;
    /// write mode emits the header and streams the body; update mode
    /// rewrites the header in place, preserving the body bytes.
    pub fn close(mut self) -> IcsResult {
        if let Some(mut state) = self.read_state.take() {
            state.finish()?;
        }
        match self.mode {
            FileMode::Read => Ok(()),
            FileMode::Write => self.write_dataset(),
            FileMode::Update => self.update_dataset(),
        }
    }

    // ── Write-mode close ───────────────────────────────────────────────────

    fn write_dataset(&mut self) -> IcsResult {
        if self.header.dims.is_empty() {
            return Err(IcsError::NoLayout);
        }
        // The legacy format is never written; an explicit request for it
        // was already upgraded by set_compression, but a header parsed
        // from elsewhere could still carry it.
        if self.header.compression == Compression::Compress {
            log::debug!("upgrading compress write to gzip");
            self.header.compression = Compression::Gzip;
        }
        self.header.byte_order =
            ics_core::ByteOrder::native(self.header.reorder_width());

        if self.header.src_file.is_some() {
            // The body lives in the named external file; only the header
            // is ours to write.
            return self.emit_header(&self.path).map(|_| ());
        }
        let data = self.data.ok_or(IcsError::MissingData)?;

        match self.header.version {
            Version::V1 => {
                self.emit_header(&self.path)?;
                let file = File::create(self.ids_path()).map_err(|_| IcsError::FOpenIds)?;
                self.write_body(file, data)
            }
            Version::V2 => {
                let mut file = self.emit_header(&self.path)?;
                file.seek(SeekFrom::End(0)).map_err(|_| IcsError::FWriteIds)?;
                self.write_body(file, data)
            }
        }
    }

    /// Create `path` and write the header text to it. The file is handed
    /// back for version-2 body appending.
    fn emit_header(&self, path: &Path) -> IcsResult<File> {
        let mut file = File::create(path).map_err(|_| IcsError::FOpenIcs)?;
        file.write_all(self.header.to_text().as_bytes())
            .map_err(|_| IcsError::FWriteIcs)?;
        Ok(file)
    }

    fn write_body(&self, file: File, data: &'buf [u8]) -> IcsResult {
        let mut writer =
            ics_codecs::open_writer(file, self.header.compression, self.compression_level)?;
        match &self.data_strides {
            Some(strides) => ics_core::codec::write_strided(
                writer.as_mut(),
                data,
                self.header.imel_size(),
                &self.header.sizes(),
                strides,
            )?,
            None => writer.write(data)?,
        }
        writer.finish()
    }

    // ── Update-mode close ──────────────────────────────────────────────────

    /// Rewrite the header. When the body is embedded in the `.ics` file
    /// the original is first moved aside, and any failure after that
    /// point rolls the move back so the original file survives intact.
    fn update_dataset(&mut self) -> IcsResult {
        let embedded = self.header.version == Version::V2 && self.header.src_file.is_none();
        if !embedded {
            // Sidecar or external body: the header file can simply be
            // replaced, nothing else refers into it.
            return self.emit_header(&self.path).map(|_| ());
        }

        let tmp = tmp_sibling(&self.path);
        fs::rename(&self.path, &tmp).map_err(|_| IcsError::FTempMoveIcs)?;

        match self.rewrite_with_body(&tmp) {
            Ok(()) => {
                fs::remove_file(&tmp).map_err(|_| IcsError::FTempMoveIcs)
            }
            Err(e) => {
                log::warn!(
                    "header update of {} failed ({e}); restoring original",
                    self.path.display()
                );
                let _ = fs::remove_file(&self.path);
                let _ = fs::rename(&tmp, &self.path);
                Err(e)
            }
        }
    }

    /// Write the new header to `self.path` and stream the body bytes out
    /// of the renamed original at the recorded offset.
    fn rewrite_with_body(&self, tmp: &Path) -> IcsResult {
        let mut out = self.emit_header(&self.path)?;
        let mut src = File::open(tmp).map_err(|_| IcsError::FOpenIcs)?;
        src.seek(SeekFrom::Start(self.data_offset))
            .map_err(|_| IcsError::FReadIds)?;
        std::io::copy(&mut src, &mut out).map_err(|_| IcsError::FCopyIds)?;
        out.flush().map_err(|_| IcsError::FCloseIcs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_string_flags() {
        assert!(parse_mode("r").is_ok());
        assert!(parse_mode("w2f").is_ok());
        assert!(parse_mode("rwl").is_ok());
        assert_eq!(parse_mode("rr").unwrap_err(), IcsError::IllParameter);
        assert_eq!(parse_mode("12").unwrap_err(), IcsError::IllParameter);
        assert_eq!(parse_mode("f").unwrap_err(), IcsError::IllParameter);
        assert_eq!(parse_mode("rx").unwrap_err(), IcsError::IllParameter);
        assert_eq!(parse_mode("").unwrap_err(), IcsError::IllParameter);
    }

    #[test]
    fn tmp_sibling_appends_to_full_name() {
        assert_eq!(
            tmp_sibling(Path::new("/data/run7.ics")),
            PathBuf::from("/data/run7.ics.tmp")
        );
    }
}
