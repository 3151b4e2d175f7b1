//! OTA firmware image header.
//!
//! An OTA image is a 1024-byte self-checksummed header followed by the raw
//! firmware bytes. The header is split into fixed regions:
//!
//! ```text
//! Offset  Size  Region
//! 0x000   64    Basic info      (magic, sizes, types, timestamp, header CRC)
//! 0x040   160   Firmware info   (name, description, versions, CRC32, SHA-256)
//! 0x0E0   64    Target info     (reserved)
//! 0x120   64    Dependencies    (reserved)
//! 0x160   416   Security        (reserved)
//! 0x300   256   Extensions      (reserved)
//! ```
//!
//! The header CRC covers all 1024 bytes with only its own field zeroed.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::checksum::{crc32, crc32_excluding, sha256, sha256_hex, SHA256_SIZE};
use crate::format::read_u32_le;
use crate::packer::write_atomic;
use crate::{PackError, Result};

/// OTA header size in bytes (fixed).
pub const OTA_HEADER_SIZE: usize = 1024;

/// Magic number identifying an OTA image ("OTAU").
pub const OTA_MAGIC: u32 = 0x4F54_4155;

/// Header layout version (1.0).
pub const OTA_HEADER_VERSION: u16 = 0x0100;

/// Capacity of the name field, including the terminating NUL.
pub const OTA_MAX_NAME_LEN: usize = 32;

/// Capacity of the description field, including the terminating NUL.
pub const OTA_MAX_DESC_LEN: usize = 64;

/// Field offsets within the header.
pub mod offsets {
    /// Magic (`u32`).
    pub const MAGIC: usize = 0x00;
    /// Header version (`u16`).
    pub const HEADER_VERSION: usize = 0x04;
    /// Header size (`u16`).
    pub const HEADER_SIZE: usize = 0x06;
    /// Header CRC32 (`u32`).
    pub const HEADER_CHECKSUM: usize = 0x08;
    /// Firmware type (`u8`).
    pub const FW_TYPE: usize = 0x0C;
    /// Encryption type (`u8`).
    pub const ENCRYPT_TYPE: usize = 0x0D;
    /// Compression type (`u8`).
    pub const COMPRESS_TYPE: usize = 0x0E;
    /// Creation time, Unix seconds (`u32`).
    pub const TIMESTAMP: usize = 0x10;
    /// Sequence number (`u32`).
    pub const SEQUENCE: usize = 0x14;
    /// Header plus firmware length (`u32`).
    pub const TOTAL_PACKAGE_SIZE: usize = 0x18;
    /// Firmware name, NUL padded.
    pub const FW_NAME: usize = 0x40;
    /// Firmware description, NUL padded.
    pub const FW_DESC: usize = 0x60;
    /// Firmware version, 4 bytes + 4 zero bytes.
    pub const FW_VERSION: usize = 0xA0;
    /// Minimum compatible version, 4 bytes + 4 zero bytes.
    pub const MIN_VERSION: usize = 0xA8;
    /// Firmware size (`u32`).
    pub const FW_SIZE: usize = 0xB0;
    /// Compressed firmware size (`u32`).
    pub const FW_SIZE_COMPRESSED: usize = 0xB4;
    /// Firmware CRC32 (`u32`).
    pub const FW_CRC32: usize = 0xB8;
    /// Firmware SHA-256.
    pub const FW_SHA256: usize = 0xBC;

    /// Target flash address (`u32`), reserved.
    pub const TARGET_ADDR: usize = 0xE0;
    /// Target region size (`u32`), reserved.
    pub const TARGET_SIZE: usize = 0xE4;
    /// Target offset (`u32`), reserved.
    pub const TARGET_OFFSET: usize = 0xE8;
    /// Target partition name (16 bytes), reserved.
    pub const TARGET_PARTITION: usize = 0xEC;
    /// Hardware version requirement (`u32`), reserved.
    pub const HW_VERSION: usize = 0xFC;
    /// Chip ID requirement (`u32`), reserved.
    pub const CHIP_ID: usize = 0x100;
}

/// A fixed sub-range of the OTA header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Region name.
    pub name: &'static str,
    /// Offset from header start.
    pub offset: usize,
    /// Length in bytes.
    pub size: usize,
    /// Whether every byte is currently reserved and written as zero.
    pub reserved: bool,
}

impl Region {
    /// End offset (exclusive).
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Header regions in order.
pub const REGIONS: [Region; 6] = [
    Region { name: "basic", offset: 0x000, size: 64, reserved: false },
    Region { name: "firmware", offset: 0x040, size: 160, reserved: false },
    Region { name: "target", offset: 0x0E0, size: 64, reserved: true },
    Region { name: "dependencies", offset: 0x120, size: 64, reserved: true },
    Region { name: "security", offset: 0x160, size: 416, reserved: true },
    Region { name: "extensions", offset: 0x300, size: 256, reserved: true },
];

const fn regions_are_contiguous() -> bool {
    let mut i = 1;
    while i < REGIONS.len() {
        if REGIONS[i - 1].end() != REGIONS[i].offset {
            return false;
        }
        i += 1;
    }
    REGIONS[0].offset == 0 && REGIONS[REGIONS.len() - 1].end() == OTA_HEADER_SIZE
}

const _: () = assert!(regions_are_contiguous());
const _: () = assert!(REGIONS[1].offset == offsets::FW_NAME);
const _: () = assert!(offsets::FW_SHA256 + SHA256_SIZE <= REGIONS[1].end());

/// Firmware type tag (byte 0x0C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FirmwareType {
    /// Unknown or unset.
    Unknown = 0x00,
    /// First stage boot loader.
    Fsbl = 0x01,
    /// Application.
    App = 0x02,
    /// Web assets.
    Web = 0x03,
    /// AI model.
    AiModel = 0x04,
    /// Configuration.
    Config = 0x05,
    /// Patch.
    Patch = 0x06,
    /// Full package.
    Full = 0x07,
}

impl FirmwareType {
    /// Every tag accepted on the command line.
    pub const TAGS: [&'static str; 7] = ["fsbl", "app", "web", "ai_model", "config", "patch", "full"];

    /// Decode a raw tag; unrecognised values map to `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => FirmwareType::Unknown,
            0x01 => FirmwareType::Fsbl,
            0x02 => FirmwareType::App,
            0x03 => FirmwareType::Web,
            0x04 => FirmwareType::AiModel,
            0x05 => FirmwareType::Config,
            0x06 => FirmwareType::Patch,
            0x07 => FirmwareType::Full,
            _ => return None,
        })
    }

    /// Command-line tag, `"unknown"` for [`FirmwareType::Unknown`].
    pub fn tag(self) -> &'static str {
        match self {
            FirmwareType::Unknown => "unknown",
            FirmwareType::Fsbl => "fsbl",
            FirmwareType::App => "app",
            FirmwareType::Web => "web",
            FirmwareType::AiModel => "ai_model",
            FirmwareType::Config => "config",
            FirmwareType::Patch => "patch",
            FirmwareType::Full => "full",
        }
    }

    /// Human-readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            FirmwareType::Unknown => "Unknown",
            FirmwareType::Fsbl => "FSBL",
            FirmwareType::App => "Application",
            FirmwareType::Web => "Web Assets",
            FirmwareType::AiModel => "AI Model",
            FirmwareType::Config => "Configuration",
            FirmwareType::Patch => "Patch",
            FirmwareType::Full => "Full Package",
        }
    }
}

impl FromStr for FirmwareType {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fsbl" => Ok(FirmwareType::Fsbl),
            "app" => Ok(FirmwareType::App),
            "web" => Ok(FirmwareType::Web),
            "ai_model" => Ok(FirmwareType::AiModel),
            "config" => Ok(FirmwareType::Config),
            "patch" => Ok(FirmwareType::Patch),
            "full" => Ok(FirmwareType::Full),
            _ => Err(PackError::UnknownFirmwareType(s.to_string())),
        }
    }
}

/// Encryption tag (byte 0x0D). Only `NONE` is ever written.
pub mod encrypt {
    /// No encryption.
    pub const NONE: u8 = 0x00;
    /// AES-128, reserved.
    pub const AES128: u8 = 0x01;
    /// AES-256, reserved.
    pub const AES256: u8 = 0x02;
}

/// Compression tag (byte 0x0E). Only `NONE` is ever written.
pub mod compress {
    /// No compression.
    pub const NONE: u8 = 0x00;
    /// gzip, reserved.
    pub const GZIP: u8 = 0x01;
    /// LZ4, reserved.
    pub const LZ4: u8 = 0x02;
}

/// Four-part firmware version `major.minor.patch.build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareVersion(pub [u8; 4]);

impl FromStr for FirmwareVersion {
    type Err = PackError;

    /// Parse `a.b.c.d`; each component is clamped to 255.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PackError::InvalidFirmwareVersion(s.to_string());
        let parts = s
            .split('.')
            .map(|p| p.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        if parts.len() != 4 {
            return Err(invalid());
        }

        let mut version = [0u8; 4];
        for (slot, part) in version.iter_mut().zip(parts) {
            *slot = part.min(255) as u8;
        }
        Ok(Self(version))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Descriptive inputs for an OTA header.
#[derive(Debug, Clone)]
pub struct OtaImageOptions {
    /// Firmware name; truncated to 31 bytes.
    pub name: String,
    /// Firmware description; truncated to 63 bytes.
    pub description: String,
    /// Firmware type tag.
    pub fw_type: FirmwareType,
    /// Firmware version.
    pub version: FirmwareVersion,
    /// Minimum compatible version; defaults to `version`.
    pub min_version: Option<FirmwareVersion>,
    /// Sequence number.
    pub sequence: u32,
    /// Creation time in Unix seconds; defaults to now.
    pub timestamp: Option<u32>,
}

impl OtaImageOptions {
    /// Options with sequence 1 and the current time.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        fw_type: FirmwareType,
        version: FirmwareVersion,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fw_type,
            version,
            min_version: None,
            sequence: 1,
            timestamp: None,
        }
    }
}

/// Decoded OTA header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaHeader {
    /// Magic.
    pub magic: u32,
    /// Header layout version.
    pub header_version: u16,
    /// Declared header size.
    pub header_size: u16,
    /// Stored header CRC32.
    pub header_checksum: u32,
    /// Raw firmware type tag.
    pub fw_type: u8,
    /// Raw encryption tag.
    pub encrypt_type: u8,
    /// Raw compression tag.
    pub compress_type: u8,
    /// Creation time, Unix seconds.
    pub timestamp: u32,
    /// Sequence number.
    pub sequence: u32,
    /// Header plus firmware length.
    pub total_package_size: u32,
    /// Firmware name.
    pub name: String,
    /// Firmware description.
    pub description: String,
    /// Firmware version.
    pub fw_version: FirmwareVersion,
    /// Minimum compatible version.
    pub min_version: FirmwareVersion,
    /// Firmware size.
    pub fw_size: u32,
    /// Compressed firmware size (equal to `fw_size`; no compression).
    pub fw_size_compressed: u32,
    /// Firmware CRC32.
    pub fw_crc32: u32,
    /// Firmware SHA-256.
    pub fw_sha256: [u8; SHA256_SIZE],
}

impl OtaHeader {
    /// Serialize header to bytes, writing `header_checksum` as stored.
    ///
    /// Reserved regions are always zero.
    pub fn to_bytes(&self) -> [u8; OTA_HEADER_SIZE] {
        let mut buf = [0u8; OTA_HEADER_SIZE];

        // Basic info
        put_u32(&mut buf, offsets::MAGIC, self.magic);
        put_u16(&mut buf, offsets::HEADER_VERSION, self.header_version);
        put_u16(&mut buf, offsets::HEADER_SIZE, self.header_size);
        put_u32(&mut buf, offsets::HEADER_CHECKSUM, self.header_checksum);
        buf[offsets::FW_TYPE] = self.fw_type;
        buf[offsets::ENCRYPT_TYPE] = self.encrypt_type;
        buf[offsets::COMPRESS_TYPE] = self.compress_type;
        put_u32(&mut buf, offsets::TIMESTAMP, self.timestamp);
        put_u32(&mut buf, offsets::SEQUENCE, self.sequence);
        put_u32(&mut buf, offsets::TOTAL_PACKAGE_SIZE, self.total_package_size);

        // Firmware info
        buf[offsets::FW_NAME..offsets::FW_NAME + OTA_MAX_NAME_LEN]
            .copy_from_slice(&pack_string::<OTA_MAX_NAME_LEN>(&self.name));
        buf[offsets::FW_DESC..offsets::FW_DESC + OTA_MAX_DESC_LEN]
            .copy_from_slice(&pack_string::<OTA_MAX_DESC_LEN>(&self.description));
        buf[offsets::FW_VERSION..offsets::FW_VERSION + 4].copy_from_slice(&self.fw_version.0);
        buf[offsets::MIN_VERSION..offsets::MIN_VERSION + 4].copy_from_slice(&self.min_version.0);
        put_u32(&mut buf, offsets::FW_SIZE, self.fw_size);
        put_u32(&mut buf, offsets::FW_SIZE_COMPRESSED, self.fw_size_compressed);
        put_u32(&mut buf, offsets::FW_CRC32, self.fw_crc32);
        buf[offsets::FW_SHA256..offsets::FW_SHA256 + SHA256_SIZE].copy_from_slice(&self.fw_sha256);

        buf
    }

    /// Deserialize header from the start of `buf`.
    ///
    /// Only the length is checked; the verifier reports everything else.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < OTA_HEADER_SIZE {
            return Err(PackError::Truncated {
                what: "OTA header",
                expected: OTA_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let mut fw_sha256 = [0u8; SHA256_SIZE];
        fw_sha256.copy_from_slice(&buf[offsets::FW_SHA256..offsets::FW_SHA256 + SHA256_SIZE]);

        Ok(Self {
            magic: read_u32_le(buf, offsets::MAGIC),
            header_version: read_u16_le(buf, offsets::HEADER_VERSION),
            header_size: read_u16_le(buf, offsets::HEADER_SIZE),
            header_checksum: read_u32_le(buf, offsets::HEADER_CHECKSUM),
            fw_type: buf[offsets::FW_TYPE],
            encrypt_type: buf[offsets::ENCRYPT_TYPE],
            compress_type: buf[offsets::COMPRESS_TYPE],
            timestamp: read_u32_le(buf, offsets::TIMESTAMP),
            sequence: read_u32_le(buf, offsets::SEQUENCE),
            total_package_size: read_u32_le(buf, offsets::TOTAL_PACKAGE_SIZE),
            name: unpack_string(&buf[offsets::FW_NAME..offsets::FW_NAME + OTA_MAX_NAME_LEN]),
            description: unpack_string(&buf[offsets::FW_DESC..offsets::FW_DESC + OTA_MAX_DESC_LEN]),
            fw_version: read_version(buf, offsets::FW_VERSION),
            min_version: read_version(buf, offsets::MIN_VERSION),
            fw_size: read_u32_le(buf, offsets::FW_SIZE),
            fw_size_compressed: read_u32_le(buf, offsets::FW_SIZE_COMPRESSED),
            fw_crc32: read_u32_le(buf, offsets::FW_CRC32),
            fw_sha256,
        })
    }

    /// Decoded firmware type, if recognised.
    pub fn firmware_type(&self) -> Option<FirmwareType> {
        FirmwareType::from_u8(self.fw_type)
    }
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_version(buf: &[u8], offset: usize) -> FirmwareVersion {
    let mut version = [0u8; 4];
    version.copy_from_slice(&buf[offset..offset + 4]);
    FirmwareVersion(version)
}

/// Encode `s` into a NUL-padded field of `N` bytes.
///
/// At most `N - 1` bytes are kept, cut back to a character boundary, so the
/// field is always NUL terminated and valid UTF-8.
pub fn pack_string<const N: usize>(s: &str) -> [u8; N] {
    let mut end = s.len().min(N.saturating_sub(1));
    while !s.is_char_boundary(end) {
        end -= 1;
    }

    let mut field = [0u8; N];
    field[..end].copy_from_slice(&s.as_bytes()[..end]);
    field
}

/// Decode a NUL-padded string field, stopping at the first NUL.
pub fn unpack_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Build the 1024-byte header for `firmware`.
pub fn build_ota_header(
    firmware: &[u8],
    options: &OtaImageOptions,
) -> Result<[u8; OTA_HEADER_SIZE]> {
    let fw_size = u32::try_from(firmware.len())
        .ok()
        .filter(|size| size.checked_add(OTA_HEADER_SIZE as u32).is_some())
        .ok_or(PackError::TooLarge {
            what: "firmware",
            size: firmware.len() as u64,
        })?;

    let header = OtaHeader {
        magic: OTA_MAGIC,
        header_version: OTA_HEADER_VERSION,
        header_size: OTA_HEADER_SIZE as u16,
        header_checksum: 0,
        fw_type: options.fw_type as u8,
        encrypt_type: encrypt::NONE,
        compress_type: compress::NONE,
        timestamp: options.timestamp.unwrap_or_else(unix_now),
        sequence: options.sequence,
        total_package_size: fw_size + OTA_HEADER_SIZE as u32,
        name: options.name.clone(),
        description: options.description.clone(),
        fw_version: options.version,
        min_version: options.min_version.unwrap_or(options.version),
        fw_size,
        fw_size_compressed: fw_size,
        fw_crc32: crc32(firmware),
        fw_sha256: sha256(firmware),
    };

    let mut buf = header.to_bytes();
    let header_checksum = crc32_excluding(&buf, offsets::HEADER_CHECKSUM);
    put_u32(&mut buf, offsets::HEADER_CHECKSUM, header_checksum);

    debug!(
        fw_size,
        fw_crc32 = format_args!("{:#010x}", header.fw_crc32),
        header_checksum = format_args!("{:#010x}", header_checksum),
        "built OTA header"
    );
    Ok(buf)
}

fn unix_now() -> u32 {
    u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX)
}

/// Read `input`, prefix it with an OTA header and write the image to `output`.
///
/// Returns the number of bytes written.
pub fn pack_firmware(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &OtaImageOptions,
) -> Result<u64> {
    let input = input.as_ref();
    let output = output.as_ref();

    let firmware = fs::read(input)?;
    debug!(path = %input.display(), size = firmware.len(), "read firmware");

    let header = build_ota_header(&firmware, options)?;
    write_atomic(output, &[&header, &firmware])?;

    let total = (header.len() + firmware.len()) as u64;
    info!(path = %output.display(), size = total, "OTA image written");
    Ok(total)
}

/// One of the independent OTA checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaCheckKind {
    /// Magic equals `OTAU`.
    Magic,
    /// Declared header size equals 1024.
    HeaderSize,
    /// Header CRC32 matches.
    HeaderChecksum,
    /// Firmware CRC32 matches.
    FirmwareCrc32,
    /// Firmware SHA-256 matches.
    FirmwareSha256,
}

impl OtaCheckKind {
    /// Label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            OtaCheckKind::Magic => "Magic number",
            OtaCheckKind::HeaderSize => "Header size",
            OtaCheckKind::HeaderChecksum => "Header CRC32",
            OtaCheckKind::FirmwareCrc32 => "Firmware CRC32",
            OtaCheckKind::FirmwareSha256 => "Firmware SHA256",
        }
    }
}

/// A value compared by an OTA check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckValue {
    /// 32-bit word (magic or CRC32).
    Word(u32),
    /// Byte count.
    Size(usize),
    /// SHA-256 digest.
    Digest([u8; SHA256_SIZE]),
}

impl fmt::Display for CheckValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckValue::Word(value) => write!(f, "{:#010X}", value),
            CheckValue::Size(value) => write!(f, "{}", value),
            CheckValue::Digest(digest) => f.write_str(&sha256_hex(digest)),
        }
    }
}

/// Outcome of one OTA check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaCheck {
    /// Which check.
    pub kind: OtaCheckKind,
    /// Whether it passed.
    pub passed: bool,
    /// Value required by the header or the format.
    pub expected: CheckValue,
    /// Value found or computed.
    pub actual: CheckValue,
}

impl OtaCheck {
    fn new(kind: OtaCheckKind, expected: CheckValue, actual: CheckValue) -> Self {
        Self {
            kind,
            passed: expected == actual,
            expected,
            actual,
        }
    }

    fn into_error(self) -> PackError {
        match (self.expected, self.actual) {
            (CheckValue::Word(expected), CheckValue::Word(actual)) => match self.kind {
                OtaCheckKind::Magic => PackError::InvalidMagic { expected, actual },
                OtaCheckKind::HeaderChecksum => PackError::ChecksumMismatch {
                    field: "OTA header",
                    expected,
                    actual,
                },
                _ => PackError::ChecksumMismatch {
                    field: "firmware",
                    expected,
                    actual,
                },
            },
            (CheckValue::Size(expected), CheckValue::Size(actual)) => {
                PackError::InvalidHeaderSize { expected, actual }
            }
            (expected, actual) => PackError::DigestMismatch {
                field: "firmware SHA-256",
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
        }
    }
}

/// Itemized result of [`verify_ota`].
#[derive(Debug, Clone)]
pub struct OtaReport {
    /// Decoded header.
    pub header: OtaHeader,
    /// Number of firmware bytes checked.
    pub firmware_len: usize,
    /// Every check, in a fixed order.
    pub checks: Vec<OtaCheck>,
}

impl OtaReport {
    /// Whether every check passed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Look up a check by kind.
    pub fn check(&self, kind: OtaCheckKind) -> Option<&OtaCheck> {
        self.checks.iter().find(|c| c.kind == kind)
    }

    /// Convert into the header, or the first failing check as an error.
    pub fn into_result(self) -> Result<OtaHeader> {
        match self.checks.into_iter().find(|c| !c.passed) {
            Some(failed) => Err(failed.into_error()),
            None => Ok(self.header),
        }
    }
}

/// Verify an OTA header against firmware bytes.
///
/// Every check runs regardless of earlier failures.
pub fn verify_ota(header_bytes: &[u8], firmware: &[u8]) -> Result<OtaReport> {
    let header = OtaHeader::from_bytes(header_bytes)?;
    let header_bytes = &header_bytes[..OTA_HEADER_SIZE];

    let checks = vec![
        OtaCheck::new(
            OtaCheckKind::Magic,
            CheckValue::Word(OTA_MAGIC),
            CheckValue::Word(header.magic),
        ),
        OtaCheck::new(
            OtaCheckKind::HeaderSize,
            CheckValue::Size(OTA_HEADER_SIZE),
            CheckValue::Size(usize::from(header.header_size)),
        ),
        OtaCheck::new(
            OtaCheckKind::HeaderChecksum,
            CheckValue::Word(header.header_checksum),
            CheckValue::Word(crc32_excluding(header_bytes, offsets::HEADER_CHECKSUM)),
        ),
        OtaCheck::new(
            OtaCheckKind::FirmwareCrc32,
            CheckValue::Word(header.fw_crc32),
            CheckValue::Word(crc32(firmware)),
        ),
        OtaCheck::new(
            OtaCheckKind::FirmwareSha256,
            CheckValue::Digest(header.fw_sha256),
            CheckValue::Digest(sha256(firmware)),
        ),
    ];

    for check in checks.iter().filter(|c| !c.passed) {
        warn!(
            check = check.kind.label(),
            expected = %check.expected,
            actual = %check.actual,
            "OTA check failed"
        );
    }

    Ok(OtaReport {
        header,
        firmware_len: firmware.len(),
        checks,
    })
}

/// Verify an OTA image file (header followed by firmware).
pub fn verify_ota_file(path: impl AsRef<Path>) -> Result<OtaReport> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    debug!(path = %path.display(), size = data.len(), "verifying OTA image");
    if data.len() < OTA_HEADER_SIZE {
        return Err(PackError::Truncated {
            what: "OTA header",
            expected: OTA_HEADER_SIZE,
            actual: data.len(),
        });
    }
    let (header, firmware) = data.split_at(OTA_HEADER_SIZE);
    verify_ota(header, firmware)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> OtaImageOptions {
        let mut options = OtaImageOptions::new(
            "APP",
            "Application firmware",
            FirmwareType::App,
            "1.0.0.1".parse().unwrap(),
        );
        options.timestamp = Some(1_760_000_000);
        options
    }

    #[test]
    fn test_region_table() {
        assert_eq!(REGIONS[1].offset, 0x40);
        assert_eq!(REGIONS.iter().map(|r| r.size).sum::<usize>(), OTA_HEADER_SIZE);
        assert!(regions_are_contiguous());
    }

    #[test]
    fn test_ten_zero_bytes_scenario() {
        let firmware = [0u8; 10];
        let header_bytes = build_ota_header(&firmware, &options()).unwrap();
        let header = OtaHeader::from_bytes(&header_bytes).unwrap();

        assert_eq!(header.fw_size, 10);
        assert_eq!(header.fw_size_compressed, 10);
        assert_eq!(header.fw_crc32, crc32(&firmware));
        assert_eq!(header.fw_crc32, 0xE38A_6876);
        assert_eq!(
            sha256_hex(&header.fw_sha256),
            "01d448afd928065458cf670b60f5a594d735af0172c8d67f22a81680132681ca"
        );
        assert_eq!(header.total_package_size, 1034);

        let report = verify_ota(&header_bytes, &firmware).unwrap();
        assert!(report.passed());
        assert_eq!(report.checks.len(), 5);

        let report = verify_ota(&header_bytes, &[0u8; 11]).unwrap();
        assert!(!report.passed());
        assert!(report.check(OtaCheckKind::Magic).unwrap().passed);
        assert!(report.check(OtaCheckKind::HeaderSize).unwrap().passed);
        assert!(report.check(OtaCheckKind::HeaderChecksum).unwrap().passed);
        assert!(!report.check(OtaCheckKind::FirmwareCrc32).unwrap().passed);
        assert!(!report.check(OtaCheckKind::FirmwareSha256).unwrap().passed);
    }

    #[test]
    fn test_header_field_placement() {
        let buf = build_ota_header(b"firmware", &options()).unwrap();

        assert_eq!(&buf[0..4], b"UATO");
        assert_eq!(read_u32_le(&buf, offsets::MAGIC), OTA_MAGIC);
        assert_eq!(read_u16_le(&buf, offsets::HEADER_VERSION), 0x0100);
        assert_eq!(read_u16_le(&buf, offsets::HEADER_SIZE), 1024);
        assert_eq!(buf[offsets::FW_TYPE], 0x02);
        assert_eq!(buf[offsets::ENCRYPT_TYPE], 0);
        assert_eq!(buf[offsets::COMPRESS_TYPE], 0);
        assert_eq!(read_u32_le(&buf, offsets::TIMESTAMP), 1_760_000_000);
        assert_eq!(read_u32_le(&buf, offsets::SEQUENCE), 1);
        assert_eq!(&buf[0xA0..0xA8], &[1, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(&buf[0xA8..0xB0], &[1, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(&buf[0x40..0x44], b"APP\0");
        assert!(buf[0x1C..0x40].iter().all(|&b| b == 0));
        assert!(buf[0xE0..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_checksum_covers_whole_header() {
        let buf = build_ota_header(b"fw", &options()).unwrap();
        let stored = read_u32_le(&buf, offsets::HEADER_CHECKSUM);
        assert_eq!(stored, crc32_excluding(&buf, offsets::HEADER_CHECKSUM));

        // A flip in a reserved region is caught by the header checksum alone.
        let mut tampered = buf;
        tampered[0x3FF] ^= 0x01;
        let report = verify_ota(&tampered, b"fw").unwrap();
        assert!(!report.check(OtaCheckKind::HeaderChecksum).unwrap().passed);
        assert!(report.check(OtaCheckKind::FirmwareCrc32).unwrap().passed);
    }

    #[test]
    fn test_checks_are_not_short_circuited() {
        let mut buf = build_ota_header(b"fw", &options()).unwrap();
        buf[0] ^= 0xFF;
        put_u16(&mut buf, offsets::HEADER_SIZE, 512);

        let report = verify_ota(&buf, b"other").unwrap();
        assert!(report.checks.iter().all(|c| !c.passed));
        assert!(matches!(
            report.into_result(),
            Err(PackError::InvalidMagic {
                expected: OTA_MAGIC,
                ..
            })
        ));
    }

    #[test]
    fn test_report_into_result() {
        let buf = build_ota_header(b"fw", &options()).unwrap();
        let header = verify_ota(&buf, b"fw").unwrap().into_result().unwrap();
        assert_eq!(header.name, "APP");

        let err = verify_ota(&buf, b"fx").unwrap().into_result().unwrap_err();
        assert!(matches!(
            err,
            PackError::ChecksumMismatch {
                field: "firmware",
                ..
            }
        ));

        let mut buf = buf;
        put_u16(&mut buf, offsets::HEADER_SIZE, 2048);
        let err = verify_ota(&buf, b"fw").unwrap().into_result().unwrap_err();
        assert!(matches!(
            err,
            PackError::InvalidHeaderSize {
                expected: 1024,
                actual: 2048
            }
        ));
    }

    #[test]
    fn test_check_value_display() {
        assert_eq!(CheckValue::Word(OTA_MAGIC).to_string(), "0x4F544155");
        assert_eq!(CheckValue::Size(1024).to_string(), "1024");
        assert_eq!(CheckValue::Digest(sha256(b"abc")).to_string().len(), 64);
    }

    #[test]
    fn test_name_truncation() {
        let name = "A".repeat(40);
        let mut options = options();
        options.name = name.clone();
        options.description = "d".repeat(100);

        let buf = build_ota_header(b"", &options).unwrap();
        assert_eq!(buf[offsets::FW_NAME + 31], 0);
        assert_eq!(buf[offsets::FW_DESC + 63], 0);

        let header = OtaHeader::from_bytes(&buf).unwrap();
        assert_eq!(header.name, name[..31]);
        assert_eq!(header.description.len(), 63);
    }

    #[test]
    fn test_pack_string_keeps_char_boundary() {
        // 'é' is two bytes; the 31-byte cut would split the last one.
        let name = format!("{}é", "a".repeat(30));
        let field = pack_string::<OTA_MAX_NAME_LEN>(&name);
        assert_eq!(unpack_string(&field), "a".repeat(30));

        let field = pack_string::<8>("abc");
        assert_eq!(&field, b"abc\0\0\0\0\0");
    }

    #[test]
    fn test_distinct_min_version() {
        let mut options = options();
        options.min_version = Some("1.0.0.0".parse().unwrap());
        let header = OtaHeader::from_bytes(&build_ota_header(b"x", &options).unwrap()).unwrap();
        assert_eq!(header.fw_version.to_string(), "1.0.0.1");
        assert_eq!(header.min_version.to_string(), "1.0.0.0");
    }

    #[test]
    fn test_firmware_version_parse() {
        assert_eq!(
            "1.2.3.4".parse::<FirmwareVersion>().unwrap(),
            FirmwareVersion([1, 2, 3, 4])
        );
        assert_eq!(
            "300.0.0.1".parse::<FirmwareVersion>().unwrap(),
            FirmwareVersion([255, 0, 0, 1])
        );
        assert!("1.0.0".parse::<FirmwareVersion>().is_err());
        assert!("1.0.0.1.2".parse::<FirmwareVersion>().is_err());
        assert!("1.x.0.1".parse::<FirmwareVersion>().is_err());
    }

    #[test]
    fn test_firmware_type_tags() {
        for tag in FirmwareType::TAGS {
            let fw_type: FirmwareType = tag.parse().unwrap();
            assert_eq!(FirmwareType::from_u8(fw_type as u8), Some(fw_type));
            assert_eq!(fw_type.tag(), tag);
        }
        assert_eq!("ai_model".parse::<FirmwareType>().unwrap() as u8, 0x04);
        assert!(matches!(
            "bootrom".parse::<FirmwareType>(),
            Err(PackError::UnknownFirmwareType(_))
        ));
        assert_eq!(FirmwareType::from_u8(0x42), None);
        assert_eq!(FirmwareType::Web.display_name(), "Web Assets");
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            verify_ota(&[0u8; 100], b""),
            Err(PackError::Truncated { .. })
        ));
    }

    #[test]
    fn test_pack_and_verify_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("app.bin");
        let output = temp_dir.path().join("app_ota.bin");
        fs::write(&input, b"\x01\x02\x03firmware").unwrap();

        let written = pack_firmware(&input, &output, &options()).unwrap();
        assert_eq!(written, 1024 + 11);
        assert_eq!(fs::metadata(&output).unwrap().len(), written);

        let report = verify_ota_file(&output).unwrap();
        assert!(report.passed());
        assert_eq!(report.firmware_len, 11);
        assert_eq!(report.header.firmware_type(), Some(FirmwareType::App));
        assert_eq!(report.header.description, "Application firmware");
    }

    #[test]
    fn test_verify_file_too_small() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("short_ota.bin");
        fs::write(&path, [0u8; 512]).unwrap();
        assert!(matches!(
            verify_ota_file(&path),
            Err(PackError::Truncated { actual: 512, .. })
        ));
    }
}
