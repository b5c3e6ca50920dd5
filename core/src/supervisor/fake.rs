//! In-memory connector used by unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::link::{Connector, Link};
use crate::config::{SshConfig, Timeouts};
use crate::errors::{FileError, SessionError};
use crate::storage::utils::base_name;
use crate::storage::DirectoryEntry;

const FIXED_MTIME: &str = "2024-01-01T00:00:00Z";

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
    Symlink(String),
}

#[derive(Default)]
struct FsState {
    nodes: BTreeMap<String, Node>,
    denied: BTreeSet<String>,
}

/// A tiny shared filesystem standing in for the SFTP server.
#[derive(Clone)]
pub(crate) struct MemFs {
    inner: Arc<Mutex<FsState>>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    path.rsplit_once('/').map(|(p, _)| {
        if p.is_empty() {
            "/".to_string()
        } else {
            p.to_string()
        }
    })
}

impl MemFs {
    pub(crate) fn new() -> Self {
        let mut state = FsState::default();
        state.nodes.insert("/".to_string(), Node::Dir);
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn add_dir(&self, path: &str) -> &Self {
        let mut state = self.inner.lock().unwrap();
        let mut current = String::new();
        for part in normalize(path).split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
        self
    }

    pub(crate) fn add_file(&self, path: &str, data: &[u8]) -> &Self {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.add_dir(&parent);
        }
        self.inner
            .lock()
            .unwrap()
            .nodes
            .insert(path, Node::File(data.to_vec()));
        self
    }

    /// Add a symlink at `path` pointing to the absolute `target`.
    pub(crate) fn add_symlink(&self, path: &str, target: &str) -> &Self {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.add_dir(&parent);
        }
        self.inner
            .lock()
            .unwrap()
            .nodes
            .insert(path, Node::Symlink(normalize(target)));
        self
    }

    pub(crate) fn deny(&self, path: &str) -> &Self {
        self.inner.lock().unwrap().denied.insert(normalize(path));
        self
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.inner.lock().unwrap().nodes.contains_key(&normalize(path))
    }

    pub(crate) fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.inner.lock().unwrap().nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }
}

impl FsState {
    fn check(&self, path: &str) -> Result<(), FileError> {
        if self.denied.contains(path) {
            return Err(FileError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    /// Follow a final symlink. Intermediate components are taken literally.
    fn resolve(&self, path: &str) -> String {
        let mut current = path.to_string();
        for _ in 0..8 {
            match self.nodes.get(&current) {
                Some(Node::Symlink(target)) => current = target.clone(),
                _ => break,
            }
        }
        current
    }

    /// Attributes of `path`, following a symlink.
    fn entry(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        let mut entry = self.link_entry(&self.resolve(path))?;
        entry.path = path.to_string();
        entry.name = base_name(path);
        Ok(entry)
    }

    /// Attributes of `path` itself, as an SFTP server reports them in
    /// directory listings.
    fn link_entry(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| FileError::NotFound(path.to_string()))?;
        let (size, is_directory) = match node {
            Node::Dir => (0, true),
            Node::File(data) => (data.len() as u64, false),
            Node::Symlink(target) => (target.len() as u64, false),
        };
        Ok(DirectoryEntry {
            path: path.to_string(),
            name: base_name(path),
            size,
            is_directory,
            modified: FIXED_MTIME.to_string(),
            permissions: Some("rw-r--r--".to_string()),
        })
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|k| parent_of(k).as_deref() == Some(path))
            .cloned()
            .collect()
    }

    fn require_dir(&self, path: &str) -> Result<(), FileError> {
        match self.nodes.get(path) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) | Some(Node::Symlink(_)) => Err(FileError::OperationFailed(
                format!("{path} is not a directory"),
            )),
            None => Err(FileError::NotFound(path.to_string())),
        }
    }
}

struct Script {
    calls: AtomicU32,
    fail_next: AtomicU32,
    probe_fails: Arc<AtomicBool>,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

/// Connector whose outcomes are scripted by the test.
#[derive(Clone)]
pub(crate) struct ScriptedConnector {
    fs: MemFs,
    script: Arc<Script>,
}

impl ScriptedConnector {
    pub(crate) fn new(fs: MemFs) -> Self {
        Self {
            fs,
            script: Arc::new(Script {
                calls: AtomicU32::new(0),
                fail_next: AtomicU32::new(0),
                probe_fails: Arc::new(AtomicBool::new(false)),
                current: Mutex::new(None),
            }),
        }
    }

    /// Make the next `n` calls to `open` fail.
    pub(crate) fn fail_next(self, n: u32) -> Self {
        self.set_fail_next(n);
        self
    }

    pub(crate) fn set_fail_next(&self, n: u32) {
        self.script.fail_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Kill the transport of the most recently opened link.
    pub(crate) fn break_transport(&self) {
        if let Some(alive) = self.script.current.lock().unwrap().as_ref() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    /// Make probes and keepalives fail while the flag is set.
    pub(crate) fn fail_probes(&self, fail: bool) {
        self.script.probe_fails.store(fail, Ordering::SeqCst);
    }
}

impl Connector for ScriptedConnector {
    type Link = MemLink;

    fn open(&self, _config: &SshConfig, _timeouts: &Timeouts) -> Result<MemLink, SessionError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.script.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.script.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(SessionError::AuthFailed("scripted rejection".to_string()));
        }

        let alive = Arc::new(AtomicBool::new(true));
        *self.script.current.lock().unwrap() = Some(Arc::clone(&alive));
        Ok(MemLink {
            fs: self.fs.clone(),
            alive,
            probe_fails: Arc::clone(&self.script.probe_fails),
        })
    }
}

pub(crate) struct MemLink {
    fs: MemFs,
    alive: Arc<AtomicBool>,
    probe_fails: Arc<AtomicBool>,
}

impl MemLink {
    fn with_fs<R>(
        &self,
        f: impl FnOnce(&mut FsState) -> Result<R, FileError>,
    ) -> Result<R, FileError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(FileError::Connectivity(SessionError::Transport(
                "connection reset by peer".to_string(),
            )));
        }
        let mut state = self.fs.inner.lock().unwrap();
        f(&mut state)
    }
}

impl Link for MemLink {
    fn is_active(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn probe(&self, _timeout: Duration) -> Result<(), SessionError> {
        if !self.is_active() || self.probe_fails.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("probe timed out".to_string()));
        }
        Ok(())
    }

    fn keepalive(&self) -> Result<(), SessionError> {
        self.probe(Duration::ZERO)
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileError> {
        let path = normalize(path);
        self.with_fs(|fs| {
            fs.check(&path)?;
            let real = fs.resolve(&path);
            fs.check(&real)?;
            fs.require_dir(&real)?;
            fs.children(&real)
                .iter()
                .map(|c| {
                    let mut entry = fs.link_entry(c)?;
                    if real != path {
                        entry.path = format!("{path}/{}", entry.name);
                    }
                    Ok(entry)
                })
                .collect()
        })
    }

    fn stat(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        let path = normalize(path);
        self.with_fs(|fs| fs.entry(&path))
    }

    fn lstat(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        let path = normalize(path);
        self.with_fs(|fs| fs.link_entry(&path))
    }

    fn read_streamed(
        &self,
        path: &str,
        chunk_size: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<u64, FileError> {
        let path = normalize(path);
        let data = self.with_fs(|fs| {
            fs.check(&path)?;
            match fs.nodes.get(&fs.resolve(&path)) {
                Some(Node::File(data)) => Ok(data.clone()),
                Some(Node::Symlink(_)) => Err(FileError::NotFound(path.clone())),
                Some(Node::Dir) => Err(FileError::OperationFailed(format!(
                    "{path} is a directory"
                ))),
                None => Err(FileError::NotFound(path.clone())),
            }
        })?;
        for chunk in data.chunks(chunk_size.max(1)) {
            sink(chunk);
        }
        Ok(data.len() as u64)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), FileError> {
        let path = normalize(path);
        self.with_fs(|fs| {
            fs.check(&path)?;
            let parent = parent_of(&path).unwrap_or_else(|| "/".to_string());
            fs.require_dir(&parent)?;
            if matches!(fs.nodes.get(&path), Some(Node::Dir)) {
                return Err(FileError::OperationFailed(format!("{path} is a directory")));
            }
            fs.nodes.insert(path.clone(), Node::File(data.to_vec()));
            Ok(())
        })
    }

    fn unlink(&self, path: &str) -> Result<(), FileError> {
        let path = normalize(path);
        self.with_fs(|fs| {
            fs.check(&path)?;
            match fs.nodes.get(&path) {
                Some(Node::File(_)) | Some(Node::Symlink(_)) => {
                    fs.nodes.remove(&path);
                    Ok(())
                }
                Some(Node::Dir) => Err(FileError::OperationFailed(format!(
                    "{path} is a directory"
                ))),
                None => Err(FileError::NotFound(path.clone())),
            }
        })
    }

    fn rmdir(&self, path: &str) -> Result<(), FileError> {
        let path = normalize(path);
        self.with_fs(|fs| {
            fs.check(&path)?;
            fs.require_dir(&path)?;
            if !fs.children(&path).is_empty() {
                return Err(FileError::OperationFailed(format!(
                    "{path} is not empty"
                )));
            }
            fs.nodes.remove(&path);
            Ok(())
        })
    }

    fn mkdir(&self, path: &str) -> Result<(), FileError> {
        let path = normalize(path);
        self.with_fs(|fs| {
            fs.check(&path)?;
            let parent = parent_of(&path).unwrap_or_else(|| "/".to_string());
            fs.require_dir(&parent)?;
            if fs.nodes.contains_key(&path) {
                return Err(FileError::OperationFailed(format!("{path} already exists")));
            }
            fs.nodes.insert(path.clone(), Node::Dir);
            Ok(())
        })
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError> {
        let from = normalize(from);
        let to = normalize(to);
        self.with_fs(|fs| {
            fs.check(&from)?;
            if !fs.nodes.contains_key(&from) {
                return Err(FileError::NotFound(from.clone()));
            }
            if fs.nodes.contains_key(&to) {
                return Err(FileError::OperationFailed(format!("{to} already exists")));
            }
            let prefix = format!("{from}/");
            let moved: Vec<String> = fs
                .nodes
                .keys()
                .filter(|k| **k == from || k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in moved {
                if let Some(node) = fs.nodes.remove(&key) {
                    let new_key = format!("{to}{}", &key[from.len()..]);
                    fs.nodes.insert(new_key, node);
                }
            }
            Ok(())
        })
    }

    fn close(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}
