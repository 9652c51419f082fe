//! The append-only audit sink.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::cipher::AuditCipher;
use crate::error::AuditResult;
use crate::record::AuditRecord;

/// Append-only audit log: one JSON object per line, optionally sealed.
///
/// The file handle is opened in append mode once and guarded by its own
/// lock; no other lock is held across the write.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
    cipher: Option<AuditCipher>,
}

impl AuditLog {
    /// Open (or create) the log at `path`.
    ///
    /// With `key`, every new line is AES-256-GCM sealed; without it the log
    /// is plaintext JSONL, backward-compatible with existing files.
    pub fn open(path: impl AsRef<Path>, key: Option<&[u8; 32]>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            cipher: key.map(AuditCipher::new),
        })
    }

    /// Whether lines are being sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// The log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. The line is on disk when this returns.
    pub fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut line = serde_json::to_string(record)?;
        if let Some(cipher) = &self.cipher {
            line = cipher.encrypt_line(&line)?;
        }

        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }

    /// Read every decodable record, oldest first.
    ///
    /// Tolerates files mixing plaintext and sealed lines (legacy rotation):
    /// each line is tried as plain JSON first, then opened with the cipher.
    /// Lines that decode neither way are skipped with a warning: a reader
    /// must not lose the rest of the log to one tampered line.
    pub fn read_all(&self) -> AuditResult<Vec<AuditRecord>> {
        let file = File::open(&self.path)?;
        let mut records = Vec::new();

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.decode_line(line) {
                Some(record) => records.push(record),
                None => {
                    tracing::warn!(line = lineno + 1, "skipping undecodable audit line");
                },
            }
        }
        Ok(records)
    }

    fn decode_line(&self, line: &str) -> Option<AuditRecord> {
        if let Ok(record) = serde_json::from_str::<AuditRecord>(line) {
            return Some(record);
        }
        let cipher = self.cipher.as_ref()?;
        let plaintext = cipher.decrypt_line(line).ok()?;
        serde_json::from_str(&plaintext).ok()
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("path", &self.path)
            .field("encrypted", &self.is_encrypted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_key() -> [u8; 32] {
        [0x42; 32]
    }

    fn record(event: &str) -> AuditRecord {
        AuditRecord::new(event, Some("admin".to_string()), json!({"n": 1}))
    }

    #[test]
    fn test_plaintext_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.log"), None).unwrap();
        assert!(!log.is_encrypted());

        log.append(&record("login")).unwrap();
        log.append(&record("tool_call_accepted")).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, "login");
        assert_eq!(records[1].event, "tool_call_accepted");

        // On disk: plain JSONL.
        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(raw.lines().all(|l| l.starts_with('{')));
    }

    #[test]
    fn test_encrypted_append_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key();
        let log = AuditLog::open(dir.path().join("audit.log"), Some(&key)).unwrap();
        assert!(log.is_encrypted());

        log.append(&record("login")).unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(!raw.contains("login"));
        assert!(!raw.trim().starts_with('{'));

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, "login");
    }

    #[test]
    fn test_mixed_plaintext_and_sealed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let key = test_key();

        // Legacy plaintext lines first...
        let plain = AuditLog::open(&path, None).unwrap();
        plain.append(&record("legacy")).unwrap();
        drop(plain);

        // ...then encryption is turned on for the same file.
        let sealed = AuditLog::open(&path, Some(&key)).unwrap();
        sealed.append(&record("sealed")).unwrap();

        let records = sealed.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, "legacy");
        assert_eq!(records[1].event, "sealed");
    }

    #[test]
    fn test_tampered_line_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let key = test_key();

        let log = AuditLog::open(&path, Some(&key)).unwrap();
        log.append(&record("good")).unwrap();
        drop(log);

        // Truncate the sealed line's tail (breaks the GCM tag), add a line
        // of garbage, then append another good record.
        let raw = std::fs::read_to_string(&path).unwrap();
        let truncated = &raw.trim_end()[..raw.trim_end().len() - 8];
        std::fs::write(&path, format!("{truncated}\ngarbage-line\n")).unwrap();

        let log = AuditLog::open(&path, Some(&key)).unwrap();
        log.append(&record("after")).unwrap();

        let records = log.read_all().unwrap();
        // The corrupted and garbage lines are skipped; the fresh one reads.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, "after");
    }

    #[test]
    fn test_append_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let log = AuditLog::open(&path, None).unwrap();
        log.append(&record("one")).unwrap();
        drop(log);

        let log = AuditLog::open(&path, None).unwrap();
        log.append(&record("two")).unwrap();

        assert_eq!(log.read_all().unwrap().len(), 2);
    }
}
