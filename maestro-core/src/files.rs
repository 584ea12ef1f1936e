//! External file contracts (§6).
//!
//! Every writer here truncates-and-overwrites or write-and-renames so a
//! concurrent reader (the DAW dispatcher, the front-end UI) never observes a
//! partially written file.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Serialize `value` to JSON and atomically replace the file at `path`.
///
/// Writes to a sibling temp file first, then renames over the destination —
/// `rename` is atomic on the same filesystem, so readers only ever see the
/// old or the new complete contents, never a partial write.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    atomic_write_bytes(path, &json)
}

/// Atomically replace the file at `path` with `bytes`.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = sibling_tmp_path(path);
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Write the command-output file (§6): a single newline-terminated line,
/// truncating any previous content first.
pub fn write_command_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    write!(f, "{text}\n")?;
    f.sync_all()?;
    Ok(())
}

fn sibling_tmp_path(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tmp".to_string());
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let tmp_name = format!(".{file_name}.{pid}.{nanos}.tmp");
    path.with_file_name(tmp_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        n: u32,
    }

    fn tmp_dir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        dir.push(format!("maestro-files-test-{nanos}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn atomic_write_json_overwrites_cleanly() {
        let dir = tmp_dir();
        let path = dir.join("status.json");
        atomic_write_json(&path, &Payload { n: 1 }).unwrap();
        atomic_write_json(&path, &Payload { n: 2 }).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let parsed: Payload = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed, Payload { n: 2 });

        let leftover_tmp_files = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftover_tmp_files, 0, "rename should have consumed the sibling temp file");
    }

    #[test]
    fn command_file_is_single_newline_terminated_line() {
        let dir = tmp_dir();
        let path = dir.join("command.txt");
        write_command_file(&path, "play").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "play\n");
    }

    #[test]
    fn command_file_truncates_previous_content() {
        let dir = tmp_dir();
        let path = dir.join("command.txt");
        write_command_file(&path, "arm track 5 and then some").unwrap();
        write_command_file(&path, "play").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "play\n");
    }
}
