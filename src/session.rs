use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PollError, PollResult};

#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<{} chars>)", self.0.len())
    }
}

pub trait SessionStore {
    fn load(&self) -> PollResult<Option<SessionToken>>;
    fn save(&mut self, token: &SessionToken) -> PollResult<()>;
}

#[derive(Debug, Clone)]
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn modified_at(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    pub fn clear(&self) -> PollResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(PollError::cache(&self.path, err)),
        }
    }

    fn write_atomic(&self, contents: &str) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl SessionStore for FileSessionCache {
    fn load(&self) -> PollResult<Option<SessionToken>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(PollError::cache(&self.path, err)),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            debug!(path = %self.path.display(), "session cache file is empty");
            return Ok(None);
        }
        Ok(Some(SessionToken::new(trimmed)))
    }

    fn save(&mut self, token: &SessionToken) -> PollResult<()> {
        self.write_atomic(token.as_str())
            .map_err(|err| PollError::cache(&self.path, err))?;
        debug!(path = %self.path.display(), token_len = token.len(), "session token cached");
        Ok(())
    }
}
