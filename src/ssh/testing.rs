//! In-memory transport used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Connector, EntryKind, RemoteEntry, RemoteFs};
use crate::config::ConnectSpec;
use crate::error::{Error, Result};

enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Default)]
pub(crate) struct MemoryState {
    nodes: Vec<(String, Node)>,
    /// Remote actions in call order, e.g. `"put /data/a.txt"`.
    pub(crate) actions: Vec<String>,
    pub(crate) closes: usize,
    pub(crate) last_spec: Option<ConnectSpec>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    match trimmed {
        "" | "." => if path.starts_with('/') { "/" } else { "." }.to_string(),
        p => p.to_string(),
    }
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => ".".to_string(),
    }
}

impl MemoryState {
    fn is_dir(&self, path: &str) -> bool {
        path == "/" || path == "." || self.nodes.iter().any(|(p, n)| p == path && matches!(n, Node::Dir))
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.nodes.iter().position(|(p, _)| p == path)
    }

    pub(crate) fn add_file(&mut self, path: &str, data: &[u8]) {
        self.nodes.push((normalize(path), Node::File(data.to_vec())));
    }

    pub(crate) fn add_dir(&mut self, path: &str) {
        self.nodes.push((normalize(path), Node::Dir));
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        let path = normalize(path);
        self.nodes.iter().find_map(|(p, n)| match n {
            Node::File(data) if *p == path => Some(data.clone()),
            _ => None,
        })
    }

    pub(crate) fn has_dir(&self, path: &str) -> bool {
        self.is_dir(&normalize(path))
    }
}

pub(crate) struct MemoryFs {
    state: Arc<Mutex<MemoryState>>,
    gate: Option<Gate>,
}

fn not_found(operation: &str, path: &str) -> Error {
    Error::operation(operation, format!("{}: No such file", path))
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.proceed.notified().await;
        }
        let mut state = self.state.lock().unwrap();
        let dir = normalize(path);
        state.actions.push(format!("list {}", dir));
        if !state.is_dir(&dir) {
            return Err(not_found("list", path));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(p, _)| *p != dir && parent_of(p) == dir)
            .map(|(p, n)| RemoteEntry {
                kind: match n {
                    Node::Dir => EntryKind::Directory,
                    Node::File(_) => EntryKind::File,
                },
                name: p.rsplit('/').next().unwrap_or(p).to_string(),
                size: match n {
                    Node::File(data) => data.len() as u64,
                    Node::Dir => 4096,
                },
                modify_time: Some(1_700_000_000_000),
                access_time: None,
                rights: None,
                owner: None,
                group: None,
            })
            .collect())
    }

    async fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("get {}", path));
        state.file(path).ok_or_else(|| not_found("get", path))
    }

    async fn write(&mut self, path: &str, data: &[u8]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("put {}", path));
        let key = normalize(path);
        if !state.is_dir(&parent_of(&key)) {
            return Err(not_found("put", path));
        }
        match state.position(&key) {
            Some(i) => state.nodes[i].1 = Node::File(data.to_vec()),
            None => state.nodes.push((key, Node::File(data.to_vec()))),
        }
        Ok(data.len() as u64)
    }

    async fn remove_file(&mut self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("delete {}", path));
        let key = normalize(path);
        match state.position(&key) {
            Some(i) if matches!(state.nodes[i].1, Node::File(_)) => {
                state.nodes.remove(i);
                Ok(())
            }
            _ => Err(not_found("delete", path)),
        }
    }

    async fn create_dir(&mut self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("mkdir {}", path));
        let key = normalize(path);
        if state.position(&key).is_some() || state.is_dir(&key) {
            return Err(Error::operation("mkdir", format!("{}: Failure", path)));
        }
        if !state.is_dir(&parent_of(&key)) {
            return Err(not_found("mkdir", path));
        }
        state.nodes.push((key, Node::Dir));
        Ok(())
    }

    async fn remove_dir(&mut self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("rmdir {}", path));
        let key = normalize(path);
        if state.nodes.iter().any(|(p, _)| parent_of(p) == key) {
            return Err(Error::operation("rmdir", format!("{}: Failure", path)));
        }
        match state.position(&key) {
            Some(i) if matches!(state.nodes[i].1, Node::Dir) => {
                state.nodes.remove(i);
                Ok(())
            }
            _ => Err(not_found("rmdir", path)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Pauses `list` until the test lets it through.
#[derive(Clone, Default)]
pub(crate) struct Gate {
    pub(crate) entered: Arc<Notify>,
    pub(crate) proceed: Arc<Notify>,
}

#[derive(Default)]
pub(crate) struct MemoryConnector {
    pub(crate) state: Arc<Mutex<MemoryState>>,
    pub(crate) connects: AtomicUsize,
    pub(crate) fail_with: Option<String>,
    pub(crate) gate: Option<Gate>,
}

impl MemoryConnector {
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub(crate) fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    /// A session on the shared state without going through `connect`.
    pub(crate) fn open(&self) -> Box<dyn RemoteFs> {
        Box::new(MemoryFs {
            state: self.state.clone(),
            gate: self.gate.clone(),
        })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, spec: &ConnectSpec) -> Result<Box<dyn RemoteFs>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.fail_with {
            return Err(Error::Connect(msg.clone()));
        }
        self.state.lock().unwrap().last_spec = Some(spec.clone());
        Ok(Box::new(MemoryFs {
            state: self.state.clone(),
            gate: self.gate.clone(),
        }))
    }
}
