//! Program sources
//!
//! A program source resolves an identifier to a readable, re-openable
//! sequence of text lines. The job opens a program twice: once to count
//! eligible lines and once to stream them.

use gcodelink_core::JobError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An open program
pub trait ProgramHandle: Send {
    /// Next raw line without its terminator, `None` at end of program
    fn next_line(&mut self) -> Result<Option<String>, JobError>;

    /// Release the underlying resource; further reads return `None`
    fn close(&mut self);
}

/// Resolves identifiers to programs
pub trait ProgramSource: Send {
    /// Whether the program exists
    fn exists(&self, identifier: &str) -> bool;

    /// Open the program for reading from its first line
    fn open(&self, identifier: &str) -> Result<Box<dyn ProgramHandle>, JobError>;
}

/// Programs stored as files under a root directory
#[derive(Debug, Clone)]
pub struct FileProgramSource {
    root: PathBuf,
}

impl FileProgramSource {
    /// Serve programs from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an identifier to a path inside the root
    ///
    /// A leading `/` is accepted and ignored; `..` and absolute
    /// components are rejected.
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf, JobError> {
        let invalid = |reason: &str| JobError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        };

        let relative = Path::new(identifier.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return Err(invalid("empty identifier"));
        }

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(invalid("parent directory reference")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("absolute path"))
                }
            }
        }

        Ok(self.root.join(relative))
    }
}

impl ProgramSource for FileProgramSource {
    fn exists(&self, identifier: &str) -> bool {
        self.resolve(identifier)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn open(&self, identifier: &str) -> Result<Box<dyn ProgramHandle>, JobError> {
        let path = self.resolve(identifier)?;
        if !path.exists() {
            return Err(JobError::NotFound {
                identifier: identifier.to_string(),
            });
        }

        let file = File::open(&path).map_err(|e| JobError::OpenFailed {
            identifier: identifier.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!("Opened program {}", path.display());
        Ok(Box::new(FileProgramHandle {
            identifier: identifier.to_string(),
            reader: Some(BufReader::new(file)),
            buf: Vec::new(),
        }))
    }
}

struct FileProgramHandle {
    identifier: String,
    reader: Option<BufReader<File>>,
    buf: Vec<u8>,
}

impl ProgramHandle for FileProgramHandle {
    fn next_line(&mut self) -> Result<Option<String>, JobError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        self.buf.clear();
        let n = reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|e| JobError::ReadFailed {
                identifier: self.identifier.clone(),
                reason: e.to_string(),
            })?;
        if n == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

#[derive(Debug, Default)]
struct MemoryCounters {
    opens: AtomicUsize,
    closes: AtomicUsize,
}

/// Programs held in memory
///
/// Clones share the same programs and counters, so a caller can keep one
/// clone for inspection after handing another to a job.
#[derive(Debug, Clone, Default)]
pub struct MemoryProgramSource {
    programs: Arc<RwLock<HashMap<String, Vec<String>>>>,
    unreadable: Arc<RwLock<Vec<String>>>,
    counters: Arc<MemoryCounters>,
}

impl MemoryProgramSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a program
    pub fn insert<I, S>(&self, identifier: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.programs.write().insert(
            identifier.to_string(),
            lines.into_iter().map(Into::into).collect(),
        );
    }

    /// Make `open` fail for a program that still exists
    pub fn set_unreadable(&self, identifier: &str) {
        self.unreadable.write().push(identifier.to_string());
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Number of handle closes
    pub fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Handles opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.open_count().saturating_sub(self.close_count())
    }
}

impl ProgramSource for MemoryProgramSource {
    fn exists(&self, identifier: &str) -> bool {
        self.programs.read().contains_key(identifier)
    }

    fn open(&self, identifier: &str) -> Result<Box<dyn ProgramHandle>, JobError> {
        if self.unreadable.read().iter().any(|id| id == identifier) {
            return Err(JobError::OpenFailed {
                identifier: identifier.to_string(),
                reason: "marked unreadable".to_string(),
            });
        }

        let lines = self
            .programs
            .read()
            .get(identifier)
            .cloned()
            .ok_or_else(|| JobError::NotFound {
                identifier: identifier.to_string(),
            })?;

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryProgramHandle {
            lines: lines.into_iter(),
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct MemoryProgramHandle {
    lines: std::vec::IntoIter<String>,
    counters: Arc<MemoryCounters>,
    closed: bool,
}

impl ProgramHandle for MemoryProgramHandle {
    fn next_line(&mut self) -> Result<Option<String>, JobError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.lines.next())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_rejects_traversal() {
        let source = FileProgramSource::new("/srv/programs");
        assert_eq!(
            source.resolve("/job.gcode").unwrap(),
            PathBuf::from("/srv/programs/job.gcode")
        );
        assert!(matches!(
            source.resolve("../etc/passwd"),
            Err(JobError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            source.resolve("a/../../b"),
            Err(JobError::InvalidIdentifier { .. })
        ));
        assert!(source.resolve("").is_err());
    }

    #[test]
    fn test_file_source_reads_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("job.gcode")).unwrap();
        write!(file, "G0 X0\r\n;comment\nM5").unwrap();

        let source = FileProgramSource::new(dir.path());
        assert!(source.exists("job.gcode"));
        assert!(!source.exists("missing.gcode"));

        let mut handle = source.open("job.gcode").unwrap();
        assert_eq!(handle.next_line().unwrap().as_deref(), Some("G0 X0"));
        assert_eq!(handle.next_line().unwrap().as_deref(), Some(";comment"));
        assert_eq!(handle.next_line().unwrap().as_deref(), Some("M5"));
        assert_eq!(handle.next_line().unwrap(), None);

        handle.close();
        assert_eq!(handle.next_line().unwrap(), None);
    }

    #[test]
    fn test_file_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileProgramSource::new(dir.path());
        assert!(matches!(
            source.open("nope.gcode"),
            Err(JobError::NotFound { .. })
        ));
    }

    #[test]
    fn test_memory_source_counts_handles() {
        let source = MemoryProgramSource::new();
        source.insert("a", ["G0", "G1"]);

        let mut handle = source.open("a").unwrap();
        assert_eq!(source.open_handles(), 1);
        handle.close();
        handle.close();
        assert_eq!(source.close_count(), 1);
        assert_eq!(source.open_handles(), 0);
    }

    #[test]
    fn test_memory_source_unreadable() {
        let source = MemoryProgramSource::new();
        source.insert("a", ["G0"]);
        source.set_unreadable("a");

        assert!(source.exists("a"));
        assert!(matches!(source.open("a"), Err(JobError::OpenFailed { .. })));
        assert_eq!(source.open_count(), 0);
    }
}
