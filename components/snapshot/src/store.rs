//! Serialization, file encoding and the checkpoint write protocol.

use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use interpreter::{Heap, Interpreter, InterpreterParts, NativeRegistry};
use parser::Ast;

use crate::error::SnapshotError;
use crate::record::{Globals, Header, Record, FORMAT_VERSION};

/// The snapshot filename suffix.
const SUFFIX: &str = ".city";
/// Suffix of in-progress writes; never a valid snapshot.
const PARTIAL_SUFFIX: &str = ".partial";

/// Flattens a paused runtime into its record list.
pub fn serialize(interp: &Interpreter) -> Vec<Record> {
    let mut records = Vec::with_capacity(
        1 + interp.ast.len()
            + interp.heap.scopes().len()
            + interp.heap.objects().len()
            + interp.stack.len(),
    );
    records.push(Record::Header(Header {
        version: FORMAT_VERSION,
        natives: interp.natives.names(),
        globals: Globals {
            global_scope: interp.global_scope,
            protos: interp.protos.clone(),
            last_value: interp.last_value.clone(),
            stack_limit: interp.stack_limit(),
        },
    }));
    for node in interp.ast.nodes() {
        records.push(Record::Node(node.clone()));
    }
    for scope in interp.heap.scopes() {
        records.push(Record::Scope(scope.clone()));
    }
    for object in interp.heap.objects() {
        records.push(Record::Object(object.clone()));
    }
    for frame in &interp.stack {
        records.push(Record::Frame(frame.clone()));
    }
    records
}

/// Rebuilds a runtime from records plus a freshly registered native table.
///
/// The stored tag table must be a prefix of (or equal to) the registered
/// one: tags are append-only across versions.
pub fn restore(records: Vec<Record>, natives: NativeRegistry) -> Result<Interpreter, SnapshotError> {
    let mut iter = records.into_iter();
    let header = match iter.next() {
        Some(Record::Header(header)) => header,
        _ => return Err(SnapshotError::Format("missing header record".to_string())),
    };
    if header.version != FORMAT_VERSION {
        return Err(SnapshotError::Format(format!(
            "unsupported format version {}",
            header.version
        )));
    }
    let current = natives.names();
    if header.natives.len() > current.len() {
        return Err(SnapshotError::NativeMismatch(format!(
            "snapshot has {} natives, this build registers {}",
            header.natives.len(),
            current.len()
        )));
    }
    for (i, name) in header.natives.iter().enumerate() {
        if current[i] != *name {
            return Err(SnapshotError::NativeMismatch(format!(
                "tag {} is '{}' in the snapshot but '{}' here",
                i, name, current[i]
            )));
        }
    }

    let mut nodes = Vec::new();
    let mut scopes = Vec::new();
    let mut objects = Vec::new();
    let mut stack = Vec::new();
    for record in iter {
        match record {
            Record::Header(_) => {
                return Err(SnapshotError::Format("duplicate header record".to_string()))
            }
            Record::Node(node) => nodes.push(node),
            Record::Scope(scope) => scopes.push(scope),
            Record::Object(object) => objects.push(object),
            Record::Frame(frame) => stack.push(frame),
        }
    }
    if stack.is_empty() {
        return Err(SnapshotError::Format("snapshot has no stack frames".to_string()));
    }

    let parts = InterpreterParts {
        ast: Ast::from_nodes(nodes),
        heap: Heap::from_parts(objects, scopes),
        stack,
        global_scope: header.globals.global_scope,
        protos: header.globals.protos,
        last_value: header.globals.last_value,
        stack_limit: header.globals.stack_limit,
    };
    Ok(Interpreter::from_parts(parts, natives))
}

/// Renders records as the on-disk text: a list with one record per line.
pub fn encode(records: &[Record]) -> Result<String, SnapshotError> {
    let mut out = String::from("[\n");
    for (i, record) in records.iter().enumerate() {
        out.push_str(&serde_json::to_string(record)?);
        if i + 1 < records.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str("]\n");
    Ok(out)
}

/// Parses the on-disk text back into records.
pub fn decode(text: &str) -> Result<Vec<Record>, SnapshotError> {
    Ok(serde_json::from_str(text)?)
}

/// The filename for a snapshot taken at `time`: an ISO-8601 UTC timestamp
/// with colons replaced by periods, so names sort by time.
pub fn snapshot_filename(time: DateTime<Utc>) -> String {
    let iso = time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    format!("{}{}", iso.replace(':', "."), SUFFIX)
}

/// Parses a snapshot filename back to its timestamp.
pub fn parse_snapshot_name(name: &str) -> Option<DateTime<Utc>> {
    let stem = name.strip_suffix(SUFFIX)?;
    // Undo the colon replacement in the time-of-day part only.
    let (date, time) = stem.split_once('T')?;
    let time = time.replacen('.', ":", 2);
    let iso = format!("{}T{}", date, time);
    match DateTime::parse_from_rfc3339(&iso) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => None,
    }
}

/// A snapshot file found in the database directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    /// Full path
    pub path: PathBuf,
    /// Timestamp parsed from the name
    pub time: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
}

/// All snapshots in a directory, oldest first.
pub fn list_snapshots(dir: &Path) -> Result<Vec<SnapshotFile>, SnapshotError> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if let Some(time) = parse_snapshot_name(name) {
            found.push(SnapshotFile {
                path: entry.path(),
                time,
                size: entry.metadata()?.len(),
            });
        }
    }
    found.sort_by_key(|f| f.time);
    Ok(found)
}

/// The newest snapshot in a directory, if any.
pub fn latest_snapshot(dir: &Path) -> Result<Option<SnapshotFile>, SnapshotError> {
    Ok(list_snapshots(dir)?.pop())
}

/// Writes a snapshot of a paused runtime.
///
/// The record list goes to `<name>.partial` first and is renamed over the
/// final name; on any failure the partial file is removed and the error
/// returned, leaving the directory without half-written snapshots.
pub fn write_snapshot(
    interp: &Interpreter,
    dir: &Path,
    time: DateTime<Utc>,
) -> Result<PathBuf, SnapshotError> {
    let name = snapshot_filename(time);
    let final_path = dir.join(&name);
    let partial_path = dir.join(format!("{}{}", name, PARTIAL_SUFFIX));

    let result = (|| -> Result<(), SnapshotError> {
        let text = encode(&serialize(interp))?;
        let mut file = fs::File::create(&partial_path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&partial_path, &final_path)?;
        Ok(())
    })();

    match result {
        Ok(()) => Ok(final_path),
        Err(e) => {
            let _ = fs::remove_file(&partial_path);
            Err(e)
        }
    }
}

/// Reads and restores a snapshot file.
pub fn read_snapshot(path: &Path, natives: NativeRegistry) -> Result<Interpreter, SnapshotError> {
    let text = fs::read_to_string(path)?;
    restore(decode(&text)?, natives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 548_000_000).unwrap()
    }

    #[test]
    fn test_filename_format() {
        let time = Utc.with_ymd_and_hms(2018, 11, 9, 18, 49, 50).unwrap()
            + chrono::Duration::milliseconds(548);
        assert_eq!(snapshot_filename(time), "2018-11-09T18.49.50.548Z.city");
    }

    #[test]
    fn test_filename_round_trip() {
        let time = ts(1_541_789_390);
        let name = snapshot_filename(time);
        assert_eq!(parse_snapshot_name(&name), Some(time));
        assert_eq!(parse_snapshot_name("notasnapshot.txt"), None);
        assert_eq!(parse_snapshot_name("x.city"), None);
    }

    #[test]
    fn test_filenames_sort_by_time() {
        let earlier = snapshot_filename(ts(1_000_000));
        let later = snapshot_filename(ts(2_000_000));
        assert!(earlier < later);
    }

    #[test]
    fn test_encode_is_one_record_per_line() {
        let records = vec![
            Record::Node(parser::Node::EmptyStatement),
            Record::Node(parser::Node::ThisExpression),
        ];
        let text = encode(&records).unwrap();
        assert!(text.starts_with("[\n"));
        assert!(text.ends_with("]\n"));
        assert_eq!(text.lines().count(), 4);
        assert_eq!(decode(&text).unwrap(), records);
    }
}
