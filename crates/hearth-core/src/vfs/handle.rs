use std::fs::File;
use std::io::{BufRead as _, BufReader, Read as _, Seek as _, SeekFrom, Write as _};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{FsError, FsResult};

/// Open disposition of a file handle. Text and binary differ only in which
/// read/write methods the handle exposes; bytes hit the disk verbatim either
/// way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadText,
    WriteText,
    AppendText,
    ReadBinary,
    WriteBinary,
    AppendBinary,
}

impl OpenMode {
    /// Parses the short mode strings guests pass (`"r"`, `"w"`, `"a"`,
    /// `"rb"`, `"wb"`, `"ab"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "r" => Some(OpenMode::ReadText),
            "w" => Some(OpenMode::WriteText),
            "a" => Some(OpenMode::AppendText),
            "rb" => Some(OpenMode::ReadBinary),
            "wb" => Some(OpenMode::WriteBinary),
            "ab" => Some(OpenMode::AppendBinary),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::ReadText => "r",
            OpenMode::WriteText => "w",
            OpenMode::AppendText => "a",
            OpenMode::ReadBinary => "rb",
            OpenMode::WriteBinary => "wb",
            OpenMode::AppendBinary => "ab",
        }
    }

    pub fn reads(self) -> bool {
        matches!(self, OpenMode::ReadText | OpenMode::ReadBinary)
    }

    pub fn writes(self) -> bool {
        !self.reads()
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            OpenMode::ReadBinary | OpenMode::WriteBinary | OpenMode::AppendBinary
        )
    }
}

/// Global open-handle budget for one machine. Acquisition is atomic so
/// producer-thread opens cannot oversubscribe; the guard releases on drop,
/// which also covers forced teardown.
#[derive(Debug)]
pub(crate) struct HandleBudget {
    max: usize,
    open: AtomicUsize,
}

impl HandleBudget {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            max,
            open: AtomicUsize::new(0),
        }
    }

    pub(crate) fn acquire(self: &Arc<Self>) -> Option<HandleGuard> {
        self.open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()?;
        Some(HandleGuard {
            budget: Arc::clone(self),
        })
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct HandleGuard {
    budget: Arc<HandleBudget>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.budget.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
enum Inner {
    Read(BufReader<File>),
    Write(File),
}

/// An open sandbox file. Owned by the guest; dropping it (explicitly via
/// [`FileHandle::close`] or implicitly at teardown) returns its slot to the
/// machine's handle budget.
#[derive(Debug)]
pub struct FileHandle {
    path: String,
    mode: OpenMode,
    inner: Inner,
    _guard: HandleGuard,
}

impl FileHandle {
    pub(crate) fn new(path: String, mode: OpenMode, file: File, guard: HandleGuard) -> Self {
        let inner = if mode.reads() {
            Inner::Read(BufReader::new(file))
        } else {
            Inner::Write(file)
        };
        Self {
            path,
            mode,
            inner,
            _guard: guard,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn reader(&mut self) -> FsResult<&mut BufReader<File>> {
        match &mut self.inner {
            Inner::Read(r) => Ok(r),
            Inner::Write(_) => Err(FsError::unsupported(&self.path, "not open for reading")),
        }
    }

    fn writer(&mut self) -> FsResult<&mut File> {
        match &mut self.inner {
            Inner::Write(f) => Ok(f),
            Inner::Read(_) => Err(FsError::unsupported(&self.path, "not open for writing")),
        }
    }

    /// Reads everything from the current position. Text handles get a lossy
    /// UTF-8 conversion; binary handles should use [`FileHandle::read`].
    pub fn read_to_string(&mut self) -> FsResult<String> {
        let path = self.path.clone();
        let r = self.reader()?;
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)
            .map_err(|e| FsError::from_io(&path, e))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Next line without its terminator; `None` at end of input.
    pub fn read_line(&mut self) -> FsResult<Option<String>> {
        let path = self.path.clone();
        let r = self.reader()?;
        let mut line = String::new();
        let n = r
            .read_line(&mut line)
            .map_err(|e| FsError::from_io(&path, e))?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Single byte; `None` at end of input.
    pub fn read_byte(&mut self) -> FsResult<Option<u8>> {
        let path = self.path.clone();
        let r = self.reader()?;
        let mut byte = [0u8; 1];
        match r.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) => Err(FsError::from_io(&path, e)),
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let path = self.path.clone();
        let r = self.reader()?;
        r.read(buf).map_err(|e| FsError::from_io(&path, e))
    }

    pub fn write_str(&mut self, s: &str) -> FsResult<()> {
        self.write_bytes(s.as_bytes())
    }

    pub fn write_line(&mut self, s: &str) -> FsResult<()> {
        self.write_bytes(s.as_bytes())?;
        self.write_bytes(b"\n")
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> FsResult<()> {
        let path = self.path.clone();
        let f = self.writer()?;
        f.write_all(bytes).map_err(|e| FsError::from_io(&path, e))
    }

    pub fn flush(&mut self) -> FsResult<()> {
        let path = self.path.clone();
        let f = self.writer()?;
        f.flush().map_err(|e| FsError::from_io(&path, e))
    }

    /// Repositions a binary handle. Text handles refuse.
    pub fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        if !self.mode.is_binary() {
            return Err(FsError::unsupported(&self.path, "seek on a text handle"));
        }
        let path = self.path.clone();
        let res = match &mut self.inner {
            Inner::Read(r) => r.seek(pos),
            Inner::Write(f) => f.seek(pos),
        };
        res.map_err(|e| FsError::from_io(&path, e))
    }

    /// Flushes (for writers) and drops the handle, releasing its budget
    /// slot.
    pub fn close(mut self) -> FsResult<()> {
        if self.mode.writes() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::OpenMode;

    #[test]
    fn mode_strings_round_trip() {
        for s in ["r", "w", "a", "rb", "wb", "ab"] {
            assert_eq!(OpenMode::parse(s).unwrap().as_str(), s);
        }
        assert!(OpenMode::parse("r+").is_none());
        assert!(OpenMode::parse("").is_none());
    }

    #[test]
    fn mode_classification() {
        assert!(OpenMode::ReadText.reads());
        assert!(!OpenMode::ReadText.is_binary());
        assert!(OpenMode::AppendBinary.writes());
        assert!(OpenMode::AppendBinary.is_binary());
        assert!(OpenMode::WriteText.writes());
    }
}
