//! Bulk operations over a directory: list, transform, apply, report.
//!
//! Every entry point checks the backend is ready first and fails only when
//! the operation cannot start at all. Per-item failures end up in the
//! returned [`BatchReport`](crate::report::BatchReport).

pub mod delete;
pub mod organize;
pub mod prune;
pub mod rename;
pub mod tree;

pub use delete::{batch_delete, delete_path};
pub use organize::{create_folders_for_files, organize, OrganizeType};
pub use prune::remove_empty_dirs;
pub use rename::{batch_rename, RenameRequest, RenameRule};
pub use tree::{print_tree, IgnoreRules, NodeStatus, TreeNode, TreeOptions, TreeReport};
