use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

const EXCLUDED_NAMES: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    "target",
    ".idea",
    ".vscode",
];
const MAX_FILES_IN_SUBDIR: usize = 4;
const MAX_TREE_DEPTH: usize = 6;

/// A validated edit waiting for approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPlan {
    pub path: PathBuf,
    pub display: String,
    /// 1-based line where the target text begins.
    pub start_line: usize,
    pub target_text: String,
    pub replacement_text: String,
    new_content: String,
}

/// File operations confined to one working directory.
pub struct FileTools {
    working_dir: PathBuf,
    canonical_working_dir: PathBuf,
}

impl FileTools {
    pub fn new(working_dir: PathBuf) -> Self {
        let canonical_working_dir =
            fs::canonicalize(&working_dir).unwrap_or_else(|_| working_dir.clone());
        Self {
            working_dir,
            canonical_working_dir,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let path = path.trim();
        if path.is_empty() {
            bail!("Security error: empty path");
        }
        if Path::new(path).is_absolute() || path.starts_with('/') || path.contains('\\') {
            bail!("Security error: absolute or platform-specific path not allowed: {path}");
        }
        if Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            bail!("Security error: path traversal detected: {path}");
        }

        let requested = self.working_dir.join(path);
        let normalized = normalize(&requested);
        self.ensure_within_workspace(&normalized)?;
        Ok(normalized)
    }

    fn ensure_within_workspace(&self, path: &Path) -> Result<()> {
        let mut guard = path;
        while !guard.exists() {
            guard = guard
                .parent()
                .context("Security error: could not find an existing parent path")?;
        }
        let canonical = fs::canonicalize(guard)
            .with_context(|| format!("Failed to canonicalize {}", guard.display()))?;
        if !canonical.starts_with(&self.canonical_working_dir) {
            bail!(
                "Security error: path escapes working directory via symlink: {}",
                path.display()
            );
        }
        Ok(())
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.working_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    pub fn read_file(&self, filename: &str) -> Result<String> {
        let resolved = self.resolve_path(filename)?;
        if !resolved.is_file() {
            bail!("Not a file or does not exist: {filename}");
        }
        fs::read_to_string(&resolved).with_context(|| format!("Failed to read {filename}"))
    }

    /// Validate the destination; the write itself happens in [`Self::write_file`].
    pub fn plan_write(&self, filename: &str) -> Result<PathBuf> {
        let resolved = self.resolve_path(filename)?;
        if resolved.is_dir() {
            bail!("{filename} is a directory");
        }
        Ok(resolved)
    }

    pub fn write_file(&self, filename: &str, content: &str) -> Result<String> {
        let resolved = self.plan_write(filename)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for {filename}"))?;
        }
        fs::write(&resolved, content).with_context(|| format!("Failed to write {filename}"))?;
        Ok(format!(
            "Saved {} ({} lines)",
            self.display(&resolved),
            content.lines().count()
        ))
    }

    pub fn plan_edit(
        &self,
        filename: &str,
        target_text: &str,
        replacement_text: &str,
    ) -> Result<EditPlan> {
        let resolved = self.resolve_path(filename)?;
        if !resolved.is_file() {
            bail!("File does not exist: {filename}");
        }
        if target_text.is_empty() {
            bail!("edit_file requires a non-empty target_text");
        }
        let content =
            fs::read_to_string(&resolved).with_context(|| format!("Failed to read {filename}"))?;

        let occurrences = content.matches(target_text).count();
        if occurrences != 1 {
            bail!(
                "target_text found {occurrences} times in {filename}; it must match exactly once"
            );
        }
        let offset = content.find(target_text).unwrap_or(0);
        let start_line = content[..offset].matches('\n').count() + 1;

        Ok(EditPlan {
            display: self.display(&resolved),
            path: resolved,
            start_line,
            target_text: target_text.to_string(),
            replacement_text: replacement_text.to_string(),
            new_content: content.replacen(target_text, replacement_text, 1),
        })
    }

    pub fn apply_edit(&self, plan: &EditPlan) -> Result<String> {
        fs::write(&plan.path, &plan.new_content)
            .with_context(|| format!("Failed to edit {}", plan.display))?;
        Ok(format!(
            "Edited {} at line {}",
            plan.display, plan.start_line
        ))
    }

    /// Directory tree: directories first, at most a few files per
    /// sub-directory. Returns the tree and the number of items listed.
    pub fn list_files(&self, path: &str, max_depth: usize) -> Result<(String, usize)> {
        let root = if path.trim().is_empty() || path.trim() == "." {
            self.working_dir.clone()
        } else {
            self.resolve_path(path)?
        };
        if !root.exists() {
            bail!("Path does not exist: {path}");
        }
        if !root.is_dir() {
            bail!("Not a directory: {path}");
        }

        let depth = max_depth.clamp(1, MAX_TREE_DEPTH);
        let mut tree = String::new();
        let count = build_tree(&root, "", depth, 0, &mut tree);
        let header = if root == self.working_dir {
            ".".to_string()
        } else {
            self.display(&root)
        };
        Ok((format!("{header}\n{tree}{count} items"), count))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn build_tree(dir: &Path, prefix: &str, max_depth: usize, depth: usize, out: &mut String) -> usize {
    if depth >= max_depth {
        out.push_str(&format!("{prefix}└─ ...\n"));
        return 1;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            out.push_str(&format!("{prefix}└─ ... ({err})\n"));
            return 1;
        }
    };

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || EXCLUDED_NAMES.contains(&name.as_str()) {
            continue;
        }
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            dirs.push(name);
        } else {
            files.push(name);
        }
    }
    dirs.sort();
    files.sort();

    let is_root = depth == 0;
    let shown_files = if is_root {
        files.len()
    } else {
        files.len().min(MAX_FILES_IN_SUBDIR)
    };
    let hidden_files = files.len() - shown_files;
    let mut count = 0;

    for (i, name) in dirs.iter().enumerate() {
        let last = i + 1 == dirs.len() && shown_files == 0 && hidden_files == 0;
        let connector = if last { "└─" } else { "├─" };
        out.push_str(&format!("{prefix}{connector} {name}/\n"));
        count += 1;
        let extension = if last { "   " } else { "│  " };
        count += build_tree(
            &dir.join(name),
            &format!("{prefix}{extension}"),
            max_depth,
            depth + 1,
            out,
        );
    }

    for (i, name) in files.iter().take(shown_files).enumerate() {
        let last = i + 1 == shown_files && hidden_files == 0;
        let connector = if last { "└─" } else { "├─" };
        out.push_str(&format!("{prefix}{connector} {name}\n"));
        count += 1;
    }

    if hidden_files > 0 {
        out.push_str(&format!("{prefix}└─ ... {hidden_files} more files\n"));
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_traversal_blocked() {
        let temp = TempDir::new().expect("temp dir");
        let files = FileTools::new(temp.path().to_path_buf());

        assert!(files.resolve_path("../../etc/passwd").is_err());
        assert!(files.resolve_path("/etc/passwd").is_err());
        assert!(files.resolve_path("..\\windows\\system32").is_err());
        assert!(files.resolve_path("").is_err());
    }

    #[test]
    fn test_filename_with_double_dots_allowed() {
        let temp = TempDir::new().expect("temp dir");
        let files = FileTools::new(temp.path().to_path_buf());
        assert!(files.resolve_path("my..file.txt").is_ok());
        assert!(files.resolve_path("nested/new/file.md").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_blocked() {
        let outside = TempDir::new().expect("outside");
        let temp = TempDir::new().expect("temp dir");
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");
        let files = FileTools::new(temp.path().to_path_buf());
        assert!(files.resolve_path("link/secret.txt").is_err());
    }

    #[test]
    fn test_write_then_read_creates_parents() {
        let temp = TempDir::new().expect("temp dir");
        let files = FileTools::new(temp.path().to_path_buf());
        let msg = files.write_file("a/b/c.txt", "hello\nworld\n").expect("write");
        assert!(msg.contains("2 lines"));
        assert_eq!(files.read_file("a/b/c.txt").expect("read"), "hello\nworld\n");
    }

    #[test]
    fn test_plan_edit_reports_start_line_and_requires_unique_match() {
        let temp = TempDir::new().expect("temp dir");
        let files = FileTools::new(temp.path().to_path_buf());
        files
            .write_file("main.rs", "fn a() {}\nfn b() {}\nfn b() {}\nfn c() {}\n")
            .expect("write");

        let plan = files.plan_edit("main.rs", "fn c() {}", "fn d() {}").expect("plan");
        assert_eq!(plan.start_line, 4);
        files.apply_edit(&plan).expect("apply");
        assert!(files.read_file("main.rs").expect("read").contains("fn d() {}"));

        let err = files.plan_edit("main.rs", "fn b() {}", "x").expect_err("duplicate");
        assert!(err.to_string().contains("2 times"));
        assert!(files.plan_edit("main.rs", "missing", "x").is_err());
    }

    #[test]
    fn test_list_files_tree_limits_subdirectory_files() {
        let temp = TempDir::new().expect("temp dir");
        let root = temp.path();
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::create_dir_all(root.join("node_modules/x")).expect("mkdir");
        for i in 0..6 {
            fs::write(root.join(format!("src/f{i}.rs")), "").expect("write");
        }
        fs::write(root.join("README.md"), "").expect("write");
        fs::write(root.join(".env"), "").expect("write");

        let files = FileTools::new(root.to_path_buf());
        let (tree, count) = files.list_files(".", 2).expect("list");
        assert!(tree.contains("├─ src/"));
        assert!(tree.contains("f3.rs"));
        assert!(!tree.contains("f4.rs"));
        assert!(tree.contains("... 2 more files"));
        assert!(tree.contains("└─ README.md"));
        assert!(!tree.contains("node_modules"));
        assert!(!tree.contains(".env"));
        // src/, four files, the elision line, README.md
        assert_eq!(count, 7);
    }

    #[test]
    fn test_list_files_path_traversal_blocked() {
        let temp = TempDir::new().expect("temp dir");
        let files = FileTools::new(temp.path().to_path_buf());
        assert!(files.list_files("../", 1).is_err());
    }
}
