//! Directory tree rendering with depth limits and glob ignore rules.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{CoreError, FileError};
use crate::storage::utils::{base_name, join_path};
use crate::storage::{SessionMode, StorageBackend};

/// Name of the pattern file read from the tree root.
pub const IGNORE_FILE_NAME: &str = ".gitignore";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeOptions {
    /// Deepest level to descend to; root children are depth 1.
    pub max_depth: Option<usize>,
    /// Read patterns from `<root>/.gitignore` (local mode only).
    pub use_ignore_file: bool,
    pub ignore_patterns: Vec<String>,
}

/// Whether a node could be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum NodeStatus {
    Ok,
    Denied,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeReport {
    pub root: TreeNode,
    pub rendered: String,
    pub directories: usize,
    pub files: usize,
}

struct IgnorePattern {
    pattern: Pattern,
    dir_only: bool,
}

/// Shell-glob ignore rules in `.gitignore` syntax (without negation).
#[derive(Default)]
pub struct IgnoreRules {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pattern line. Blank lines, comments and `!` negations are
    /// skipped; invalid globs are logged and skipped.
    pub fn add(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        if line.starts_with('!') {
            debug!("Negated ignore pattern '{}' is not supported", line);
            return;
        }

        let dir_only = line.ends_with('/');
        let glob = line.trim_end_matches('/').trim_start_matches('/');
        if glob.is_empty() {
            return;
        }
        match Pattern::new(glob) {
            Ok(pattern) => self.patterns.push(IgnorePattern { pattern, dir_only }),
            Err(e) => warn!("Invalid glob pattern '{}': {}", glob, e),
        }
    }

    pub fn extend<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
        for line in lines {
            self.add(line);
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Match against the root-relative path and the bare name.
    pub fn is_ignored(&self, relative: &str, name: &str, is_dir: bool) -> bool {
        self.patterns.iter().any(|p| {
            (!p.dir_only || is_dir) && (p.pattern.matches(relative) || p.pattern.matches(name))
        })
    }
}

fn load_ignore_file(backend: &dyn StorageBackend, root: &str, rules: &mut IgnoreRules) {
    if backend.mode() != SessionMode::Local {
        debug!("Skipping {} for remote tree", IGNORE_FILE_NAME);
        return;
    }
    let path = join_path(root, IGNORE_FILE_NAME);
    match backend.read_file(&path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            rules.extend(text.lines());
            debug!("Loaded {} ignore patterns from {}", rules.len(), path);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!("Could not read {}: {}", path, e),
    }
}

struct Walker<'a> {
    backend: &'a dyn StorageBackend,
    root: String,
    rules: IgnoreRules,
    max_depth: Option<usize>,
    directories: usize,
    files: usize,
}

impl Walker<'_> {
    fn relative(&self, path: &str) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .trim_start_matches('/')
            .to_string()
    }

    fn children(&mut self, dir: &str, depth: usize) -> (NodeStatus, Vec<TreeNode>) {
        if self.max_depth.is_some_and(|max| depth >= max) {
            return (NodeStatus::Ok, Vec::new());
        }

        let entries = match self.backend.list_dir(dir) {
            Ok(entries) => entries,
            Err(FileError::PermissionDenied(_)) => return (NodeStatus::Denied, Vec::new()),
            Err(e) => {
                debug!("Cannot list {}: {}", dir, e);
                return (NodeStatus::Error(e.to_string()), Vec::new());
            }
        };

        let (mut dirs, mut files): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .filter(|e| !self.rules.is_ignored(&self.relative(&e.path), &e.name, e.is_directory))
            .partition(|e| e.is_directory);
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let mut nodes = Vec::with_capacity(dirs.len() + files.len());
        for d in dirs {
            self.directories += 1;
            let (status, children) = self.children(&d.path, depth + 1);
            nodes.push(TreeNode {
                name: d.name,
                path: d.path,
                is_directory: true,
                status,
                children,
            });
        }
        for f in files {
            self.files += 1;
            nodes.push(TreeNode {
                name: f.name,
                path: f.path,
                is_directory: false,
                status: NodeStatus::Ok,
                children: Vec::new(),
            });
        }
        (NodeStatus::Ok, nodes)
    }
}

fn render_children(nodes: &[TreeNode], prefix: &str, out: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        let (branch, indent) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        out.push_str(prefix);
        out.push_str(branch);
        out.push_str(&node.name);
        if node.is_directory {
            out.push('/');
        }
        out.push('\n');

        let child_prefix = format!("{prefix}{indent}");
        render_status(&node.status, &child_prefix, out);
        render_children(&node.children, &child_prefix, out);
    }
}

fn render_status(status: &NodeStatus, prefix: &str, out: &mut String) {
    let marker = match status {
        NodeStatus::Ok => return,
        NodeStatus::Denied => "[denied]".to_string(),
        NodeStatus::Error(message) => format!("[error: {message}]"),
    };
    out.push_str(prefix);
    out.push_str("└── ");
    out.push_str(&marker);
    out.push('\n');
}

/// Render the tree under `root`.
///
/// Directories come before files, each group sorted by name. Unreadable
/// subdirectories appear with an inline `[denied]` or `[error]` leaf; only
/// an unusable root fails the call.
pub fn print_tree(
    backend: &dyn StorageBackend,
    root: &str,
    options: &TreeOptions,
) -> Result<TreeReport, CoreError> {
    backend.ensure_ready()?;
    let root_entry = backend.stat(root)?;
    if !root_entry.is_directory {
        return Err(CoreError::InvalidInput(format!("{root} is not a directory")));
    }

    let mut rules = IgnoreRules::new();
    rules.extend(options.ignore_patterns.iter().map(String::as_str));
    if options.use_ignore_file {
        load_ignore_file(backend, root, &mut rules);
    }

    let root_path = root.trim_end_matches('/').to_string();
    let mut walker = Walker {
        backend,
        root: if root_path.is_empty() { "/".to_string() } else { root_path },
        rules,
        max_depth: options.max_depth,
        directories: 0,
        files: 0,
    };

    let list_root = walker.root.clone();
    let (status, children) = walker.children(&list_root, 0);
    if let NodeStatus::Denied = status {
        return Err(FileError::PermissionDenied(root.to_string()).into());
    }
    if let NodeStatus::Error(message) = status {
        return Err(FileError::OperationFailed(message).into());
    }

    let name = match base_name(root) {
        n if n.is_empty() => root.to_string(),
        n => n,
    };
    let root_node = TreeNode {
        name,
        path: root.to_string(),
        is_directory: true,
        status: NodeStatus::Ok,
        children,
    };

    let mut rendered = format!("{root}\n");
    render_children(&root_node.children, "", &mut rendered);
    rendered.push_str(&format!(
        "\n{} directories, {} files\n",
        walker.directories, walker.files
    ));

    info!(
        "Tree of {} ({}): {} directories, {} files",
        root,
        backend.mode().as_str(),
        walker.directories,
        walker.files
    );

    Ok(TreeReport {
        root: root_node,
        rendered,
        directories: walker.directories,
        files: walker.files,
    })
}
