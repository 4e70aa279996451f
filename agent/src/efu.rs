//! Offline update containers (.efu)
//!
//! A container bundles a firmware image and a filesystem image into one
//! distributable update file:
//!
//! ```text
//! signature (4 bytes, "EFU\0")
//! version   (u16, big-endian)
//! records:
//!   type    (u16, big-endian)
//!   length  (u32, big-endian)
//!   data    (length bytes)
//! ```
//!
//! Exactly two records are written, firmware first. There is no checksum or
//! trailer; a reader walks records purely by the declared lengths and stops
//! at end-of-file. The pre-v2 encoding with a single-byte length field is
//! unsupported: it cannot represent images over 255 bytes.

use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::errors::AgentError;

/// Container file signature
pub const SIGNATURE: [u8; 4] = *b"EFU\0";

/// Container format version
pub const VERSION: u16 = 2;

/// Record types, in the order they appear in a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RecordType {
    FirmwareImage = 1,
    FilesystemImage = 2,
}

impl RecordType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(RecordType::FirmwareImage),
            2 => Some(RecordType::FilesystemImage),
            _ => None,
        }
    }
}

/// One record read back out of a container
#[derive(Debug)]
pub struct Record {
    pub record_type: u16,
    pub data: Vec<u8>,
}

/// Build a container from a firmware image and a filesystem image
pub async fn build(firmware: &Path, filesystem: &Path, target: &Path) -> Result<(), AgentError> {
    let mut out = BufWriter::new(fs::File::create(target).await?);

    out.write_all(&SIGNATURE).await?;
    out.write_all(&VERSION.to_be_bytes()).await?;

    write_record(&mut out, RecordType::FirmwareImage, firmware).await?;
    write_record(&mut out, RecordType::FilesystemImage, filesystem).await?;

    out.flush().await?;
    out.into_inner().sync_all().await?;
    Ok(())
}

async fn write_record(
    out: &mut BufWriter<fs::File>,
    record_type: RecordType,
    source: &Path,
) -> Result<(), AgentError> {
    // the declared length comes from filesystem metadata and the data must
    // match it exactly; a short source means a corrupt container, not a
    // shorter record
    let declared = fs::metadata(source).await?.len();
    let declared = u32::try_from(declared).map_err(|_| {
        AgentError::UpdateError(format!(
            "{} exceeds the 4 GiB record limit",
            source.display()
        ))
    })?;

    let data = fs::read(source).await?;
    if data.len() != declared as usize {
        return Err(AgentError::UpdateError(format!(
            "{} is truncated: expected {} bytes, read {}",
            source.display(),
            declared,
            data.len()
        )));
    }

    out.write_all(&(record_type as u16).to_be_bytes()).await?;
    out.write_all(&declared.to_be_bytes()).await?;
    out.write_all(&data).await?;
    Ok(())
}

/// Read every record out of a container
pub async fn read(path: &Path) -> Result<Vec<Record>, AgentError> {
    let mut input = BufReader::new(fs::File::open(path).await?);

    let mut signature = [0u8; 4];
    input.read_exact(&mut signature).await?;
    if signature != SIGNATURE {
        return Err(AgentError::UpdateError(format!(
            "{} is not an update container",
            path.display()
        )));
    }

    let mut version = [0u8; 2];
    input.read_exact(&mut version).await?;
    let version = u16::from_be_bytes(version);
    if version != VERSION {
        return Err(AgentError::UpdateError(format!(
            "unsupported container version {}",
            version
        )));
    }

    let mut records = Vec::new();
    loop {
        let mut raw_type = [0u8; 2];
        match input.read_exact(&mut raw_type).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let mut raw_len = [0u8; 4];
        input.read_exact(&mut raw_len).await?;
        let len = u32::from_be_bytes(raw_len) as usize;

        let mut data = vec![0u8; len];
        input.read_exact(&mut data).await?;

        records.push(Record {
            record_type: u16::from_be_bytes(raw_type),
            data,
        });
    }

    Ok(records)
}
