//! Resource checks used to lift a resource-exhaustion halt.

use std::fs;
use std::path::PathBuf;

/// Checks whether the executor can resume work.
pub trait ResourceProbe: Send + Sync {
    fn check(&self) -> Result<(), String>;
}

/// Always passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProbe;

impl ResourceProbe for NoopProbe {
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Passes when a small file can be written to and removed from a directory.
#[derive(Debug, Clone)]
pub struct WritableDirProbe {
    dir: PathBuf,
}

const PROBE_FILE: &str = ".curator-probe";
const PROBE_BYTES: usize = 64 * 1024;

impl WritableDirProbe {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ResourceProbe for WritableDirProbe {
    fn check(&self) -> Result<(), String> {
        let path = self.dir.join(PROBE_FILE);
        fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&path, vec![0u8; PROBE_BYTES]))
            .and_then(|_| fs::remove_file(&path))
            .map_err(|e| format!("{}: {}", self.dir.display(), e))
    }
}
