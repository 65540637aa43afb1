use crate::error::{CameraError, CameraResult};
use crate::types::{FormatKey, OutputRole, SupportLevel, SurfaceFormat};
use tracing::debug;

/// Maximum number of stream-producing surfaces in one session
pub const MAX_SURFACE_COUNT: usize = 3;

type TableKey = [Option<FormatKey>; MAX_SURFACE_COUNT];
type TableRoles = [Option<OutputRole>; MAX_SURFACE_COUNT];

use FormatKey::{Jpeg, Priv, Yuv};
use OutputRole::{Maximum, Preview, Record};

const LEGACY_TABLE: &[(TableKey, TableRoles)] = &[
    ([Some(Priv), None, None], [Some(Maximum), None, None]),
    ([Some(Jpeg), None, None], [Some(Maximum), None, None]),
    ([Some(Yuv), None, None], [Some(Maximum), None, None]),
    (
        [Some(Priv), Some(Jpeg), None],
        [Some(Preview), Some(Maximum), None],
    ),
    (
        [Some(Yuv), Some(Jpeg), None],
        [Some(Preview), Some(Maximum), None],
    ),
    (
        [Some(Priv), Some(Priv), None],
        [Some(Preview), Some(Preview), None],
    ),
    (
        [Some(Priv), Some(Yuv), None],
        [Some(Preview), Some(Preview), None],
    ),
    (
        [Some(Priv), Some(Priv), Some(Jpeg)],
        [Some(Preview), Some(Preview), Some(Maximum)],
    ),
    (
        [Some(Priv), Some(Yuv), Some(Jpeg)],
        [Some(Preview), Some(Preview), Some(Maximum)],
    ),
];

const LIMITED_TABLE: &[(TableKey, TableRoles)] = &[
    (
        [Some(Priv), Some(Priv), None],
        [Some(Preview), Some(Record), None],
    ),
    (
        [Some(Priv), Some(Yuv), None],
        [Some(Preview), Some(Record), None],
    ),
    (
        [Some(Yuv), Some(Yuv), None],
        [Some(Preview), Some(Record), None],
    ),
    (
        [Some(Priv), Some(Priv), Some(Jpeg)],
        [Some(Preview), Some(Record), Some(Record)],
    ),
    (
        [Some(Priv), Some(Yuv), Some(Jpeg)],
        [Some(Preview), Some(Record), Some(Record)],
    ),
    (
        [Some(Yuv), Some(Yuv), Some(Jpeg)],
        [Some(Preview), Some(Preview), Some(Maximum)],
    ),
];

const FULL_TABLE: &[(TableKey, TableRoles)] = &[
    (
        [Some(Priv), Some(Priv), None],
        [Some(Preview), Some(Maximum), None],
    ),
    (
        [Some(Priv), Some(Yuv), None],
        [Some(Preview), Some(Maximum), None],
    ),
    (
        [Some(Yuv), Some(Yuv), None],
        [Some(Preview), Some(Maximum), None],
    ),
    (
        [Some(Priv), Some(Priv), Some(Jpeg)],
        [Some(Preview), Some(Preview), Some(Maximum)],
    ),
];

/// Tables consulted for a device, richest first
fn tables_for(level: SupportLevel) -> Vec<(SupportLevel, &'static [(TableKey, TableRoles)])> {
    let mut tables = Vec::with_capacity(3);
    if level >= SupportLevel::Full {
        tables.push((SupportLevel::Full, FULL_TABLE));
    }
    if level >= SupportLevel::Limited {
        tables.push((SupportLevel::Limited, LIMITED_TABLE));
    }
    tables.push((SupportLevel::Legacy, LEGACY_TABLE));
    tables
}

fn lookup(table: &[(TableKey, TableRoles)], key: &TableKey) -> Option<TableRoles> {
    table
        .iter()
        .find(|(row_key, _)| row_key == key)
        .map(|(_, roles)| *roles)
}

fn describe_keys(keys: &[FormatKey]) -> String {
    let names: Vec<String> = keys.iter().map(|key| format!("{:?}", key)).collect();
    format!("[{}]", names.join(", "))
}

/// Assign roles to an ordered list of collapsed format keys.
///
/// Scans from the device's own level downward; the first table with a
/// matching row is authoritative.
pub fn classify_keys(level: SupportLevel, keys: &[FormatKey]) -> CameraResult<Vec<OutputRole>> {
    let mismatch = || CameraError::ConfigurationMismatch {
        level: level.to_string(),
        formats: describe_keys(keys),
    };

    if keys.is_empty() || keys.len() > MAX_SURFACE_COUNT {
        return Err(mismatch());
    }

    let mut table_key: TableKey = [None; MAX_SURFACE_COUNT];
    for (slot, key) in table_key.iter_mut().zip(keys) {
        *slot = Some(*key);
    }

    for (table_level, table) in tables_for(level) {
        if let Some(roles) = lookup(table, &table_key) {
            debug!(
                "Matched {} against {} table for {} device",
                describe_keys(keys),
                table_level,
                level
            );
            let assigned: Option<Vec<OutputRole>> =
                roles.iter().take(keys.len()).copied().collect();
            return assigned.ok_or_else(mismatch);
        }
    }

    Err(mismatch())
}

/// Assign a role to every surface format; watcher surfaces get `None`.
pub fn classify(
    level: SupportLevel,
    formats: &[SurfaceFormat],
) -> CameraResult<Vec<Option<OutputRole>>> {
    let keys: Vec<FormatKey> = formats.iter().filter_map(|format| format.key()).collect();
    let mut roles = classify_keys(level, &keys)?.into_iter();

    Ok(formats
        .iter()
        .map(|format| format.key().and_then(|_| roles.next()))
        .collect())
}
