//! Append-only JSON-lines audit log of resolution outcomes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use helix_core_types::ResolutionOutcome;
use parking_lot::Mutex;
use tracing::warn;

pub struct OutcomeLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    appended: AtomicU64,
}

impl OutcomeLog {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            appended: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, outcome: &ResolutionOutcome) -> io::Result<()> {
        let mut line = serde_json::to_vec(outcome)
            .map_err(|err| io::Error::new(ErrorKind::Other, err.to_string()))?;
        line.push(b'\n');
        self.writer.lock().write_all(&line)?;
        self.appended.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }

    /// Records appended by this handle.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Every readable record in the file; malformed lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> io::Result<Vec<ResolutionOutcome>> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut outcomes = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(line = number + 1, error = %err, "skipping malformed outcome record"),
            }
        }
        Ok(outcomes)
    }
}

impl Drop for OutcomeLog {
    fn drop(&mut self) {
        let _ = self.writer.lock().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core_types::RequestId;

    #[test]
    fn records_accumulate_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("outcomes.jsonl");
        {
            let log = OutcomeLog::open(&path).unwrap();
            log.append(&ResolutionOutcome::new(RequestId::new(), None, false, 12, 3))
                .unwrap();
            log.flush().unwrap();
        }
        let log = OutcomeLog::open(&path).unwrap();
        log.append(&ResolutionOutcome::new(RequestId::new(), None, true, 4, 0))
            .unwrap();
        log.flush().unwrap();

        let outcomes = OutcomeLog::read_all(&path).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].healing_attempts, 3);
        assert!(outcomes[1].success);
        assert_eq!(log.appended(), 1);
    }
}
