// ── Attribute mapping (remote ATTRS ⇄ native metadata) ───────────────────────

use crate::sshfs::transport::RemoteAttrs;
use crate::sshfs::types::{FileAttributes, FileMetadata};
use chrono::{DateTime, Utc};

/// Convert remote attributes into the record handed to the driver.
///
/// SFTP carries no creation time, so creation mirrors the modify time.
/// Names starting with `.` are flagged hidden.
pub fn to_metadata(name: &str, attrs: &RemoteAttrs, offline: bool) -> FileMetadata {
    let mut attributes = if attrs.is_dir() {
        FileAttributes::DIRECTORY
    } else {
        FileAttributes::NORMAL
    };
    if offline {
        attributes |= FileAttributes::OFFLINE;
    }
    if name.starts_with('.') {
        attributes |= FileAttributes::HIDDEN;
    }

    let modified = epoch_to_datetime(attrs.mtime.unwrap_or(0));
    FileMetadata {
        file_name: name.to_string(),
        attributes,
        creation_time: modified,
        last_access_time: epoch_to_datetime(attrs.atime.unwrap_or(0)),
        last_write_time: modified,
        length: attrs.size.unwrap_or(0),
    }
}

/// Seconds since 1970-01-01T00:00:00Z as a calendar time.
pub fn epoch_to_datetime(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .unwrap_or_default()
}

/// Epoch seconds for a driver-supplied time, or `None` when the driver
/// left the field unset. Anything before 1970 (including the `FILETIME`
/// zero value and `DateTime::MIN_UTC`) counts as unset.
pub fn datetime_to_epoch(time: Option<DateTime<Utc>>) -> Option<u64> {
    time.and_then(|t| u64::try_from(t.timestamp()).ok())
}

/// Permission bits as the octal text exposed by the permission stream.
pub fn format_permission_octal(bits: u32) -> String {
    format!("{:03o}\n", bits & 0o7777)
}

/// Parse octal permission text written to the permission stream.
pub fn parse_permission_octal(text: &str) -> Result<u32, String> {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if trimmed.is_empty() {
        return Err("empty permission string".into());
    }
    let bits = u32::from_str_radix(trimmed, 8)
        .map_err(|e| format!("invalid octal permission '{}': {}", trimmed, e))?;
    if bits > 0o7777 {
        return Err(format!("permission {:o} out of range", bits));
    }
    Ok(bits)
}

/// Human-readable permissions string like "drwxr-xr-x".
pub fn format_permissions(mode: u32) -> String {
    let mut s = String::with_capacity(10);

    s.push(match mode & 0o170000 {
        0o040000 => 'd',
        0o120000 => 'l',
        0o010000 => 'p',
        0o140000 => 's',
        0o060000 => 'b',
        0o020000 => 'c',
        _ => '-',
    });

    let triplet = |s: &mut String, r: u32, w: u32, x: u32, special: u32, set: char, unset: char| {
        s.push(if mode & r != 0 { 'r' } else { '-' });
        s.push(if mode & w != 0 { 'w' } else { '-' });
        s.push(match (mode & special != 0, mode & x != 0) {
            (true, true) => set,
            (true, false) => unset,
            (false, true) => 'x',
            (false, false) => '-',
        });
    };

    triplet(&mut s, 0o400, 0o200, 0o100, 0o4000, 's', 'S');
    triplet(&mut s, 0o040, 0o020, 0o010, 0o2000, 's', 'S');
    triplet(&mut s, 0o004, 0o002, 0o001, 0o1000, 't', 'T');

    s
}
