//! Everything that differs between host platforms lives here.

use std::path::{Path, PathBuf};

/// Name of the Python interpreter to invoke from the host's `PATH`.
pub fn host_python() -> &'static str {
  if cfg!(windows) {
    "python"
  } else {
    "python3"
  }
}

/// Path of the interpreter inside a virtual environment rooted at `target`.
pub fn venv_python(target: &Path) -> PathBuf {
  if cfg!(windows) {
    target.join("Scripts").join("python.exe")
  } else {
    target.join("bin").join("python")
  }
}
