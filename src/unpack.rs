//! Extracting containers to disk.
//!
//! Two layouts are supported:
//!
//! * **flat** ([`unpack_flat`]): one file per element, data inflated when
//!   it is packed.  Nested containers are written as opaque files.
//! * **recursive** ([`unpack_recursive`]): every element whose (inflated)
//!   bytes form a container becomes a directory of the same name, expanded
//!   the same way; everything else becomes a file.
//!
//! An element whose stored data is damaged is written as far as it can be
//! read, logged, and listed in [`UnpackReport::damaged`]; its siblings are
//! still extracted.  Errors writing the output always abort.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::container::{is_container, Container};
use crate::element::Element;
use crate::error::{Error, Result};

/// Suffix of the scratch file each element is written to before it is
/// classified.
pub const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnpackReport {
    /// Leaf files written.
    pub files_written:       usize,
    /// Nested containers expanded into directories.
    pub containers_expanded: usize,
    /// Output paths of elements whose data could not be read completely.
    pub damaged:             Vec<PathBuf>,
}

/// Called once per element, before it is extracted.
pub type Progress<'a> = &'a mut dyn FnMut(&Element);

/// Write every element of `container` into `dest`, inflating packed data.
pub fn unpack_flat<S: Read + Seek>(container: &Container<S>, dest: &Path) -> Result<UnpackReport> {
    fs::create_dir_all(dest)?;
    let mut report = UnpackReport::default();
    for element in container.files() {
        let element = element?;
        let path = dest.join(safe_file_name(element.name()));
        extract_to(container, &element, &path, &mut report)?;
        report.files_written += 1;
    }
    Ok(report)
}

/// Write `container` into `dest`, expanding nested containers into
/// directories.
pub fn unpack_recursive<S: Read + Seek>(
    container: &Container<S>,
    dest:      &Path,
    progress:  Option<Progress<'_>>,
) -> Result<UnpackReport> {
    let mut report = UnpackReport::default();
    let mut progress = progress;
    expand(container, dest, &mut report, &mut progress)?;
    Ok(report)
}

fn expand<S: Read + Seek>(
    container: &Container<S>,
    dest:      &Path,
    report:    &mut UnpackReport,
    progress:  &mut Option<Progress<'_>>,
) -> Result<()> {
    fs::create_dir_all(dest)?;
    for element in container.files() {
        let element = element?;
        if let Some(cb) = progress.as_mut() {
            cb(&element);
        }

        let path = dest.join(safe_file_name(element.name()));
        let tmp  = with_suffix(&path, TEMP_SUFFIX);
        extract_to(container, &element, &tmp, report)?;

        let mut scratch = File::open(&tmp)?;
        if is_container(&mut scratch)? {
            debug!(element = %element, "expanding nested container");
            let inner = Container::from_reader(scratch)?;
            expand(&inner, &path, report, progress)?;
            drop(inner);
            fs::remove_file(&tmp)?;
            report.containers_expanded += 1;
        } else {
            drop(scratch);
            if path.is_file() {
                fs::remove_file(&path)?;
            }
            fs::rename(&tmp, &path)?;
            report.files_written += 1;
        }
    }
    Ok(())
}

/// Copy one element's inflated data to `path`.  Damage in the stored data
/// is recorded in the report rather than returned.
fn extract_to<S: Read + Seek>(
    container: &Container<S>,
    element:   &Element,
    path:      &Path,
    report:    &mut UnpackReport,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    let copied = match container.open_stream(element, true) {
        Ok(mut stream) => copy_lenient(&mut stream, &mut out),
        Err(Error::Format(err)) => Err(io::Error::new(io::ErrorKind::InvalidData, err)),
        Err(err) => return Err(err),
    };
    match copied {
        Ok(n) => debug!(element = %element, bytes = n, "element extracted"),
        Err(err) if is_damage(&err) => {
            warn!(element = %element, %err, "element data is damaged; output truncated");
            report.damaged.push(path.to_path_buf());
        }
        Err(err) => return Err(err.into()),
    }
    out.flush()?;
    Ok(())
}

/// `io::copy` that keeps what was written before a read error.
fn copy_lenient<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

/// Corrupt chains surface as `InvalidData`; corrupt deflate data as
/// `InvalidInput` or `InvalidData`, depending on the decoder.
fn is_damage(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput)
}

/// Element names come from the file; keep them inside the destination.
pub fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
