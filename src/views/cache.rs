//! On-disk cache of compiled view trees
//!
//! Each view has at most one artifact, named
//! `<md5(view name)>.<md5(view name + compiled json)>.json`. An artifact is
//! reused while its mtime is not older than the source file's mtime. Writes
//! go through a temporary file and a rename, so concurrent writers of the same
//! view never expose a partial artifact; the last writer wins.

use crate::error::Result;
use crate::views::ast::Template;
use crate::views::parser;
use dashmap::DashMap;
use md5::{Digest, Md5};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Counters describing cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Renders served from an existing artifact
    pub hits: u64,
    /// Renders that found no fresh artifact
    pub misses: u64,
    /// Source compilations performed
    pub compilations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct CompiledCache {
    directory: Option<PathBuf>,
    /// View name -> artifact path, so warm lookups skip the directory scan
    index: DashMap<String, PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
    compilations: AtomicU64,
}

fn md5_hex(input: &[u8]) -> String {
    hex::encode(Md5::digest(input))
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Read a view source file and compile it
pub fn compile_file(name: &str, source_path: &Path) -> Result<Template> {
    let source = fs::read_to_string(source_path).map_err(|e| {
        let message = format!(
            "Failed to read view '{}' from {}: {}",
            name,
            source_path.display(),
            e
        );
        crate::error::Error::from(e).with_context(message)
    })?;

    parser::compile(&source).map_err(|e| {
        let message = format!("Failed to compile view '{}': {}", name, e);
        e.with_context(message)
    })
}

impl CompiledCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
            index: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
        }
    }

    /// Cache that compiles on every call and never touches the disk
    pub fn disabled() -> Self {
        Self {
            directory: None,
            index: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.directory.is_some()
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Compiled tree for `name`, from a fresh artifact or a new compilation
    pub fn load_or_compile(&self, name: &str, source_path: &Path) -> Result<Template> {
        if let Some(directory) = &self.directory {
            if let Some(template) = self.load_fresh(directory, name, source_path) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("View cache hit for '{}'", name);
                return Ok(template);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let template = self.compile(name, source_path)?;

        if let Some(directory) = &self.directory {
            self.store(directory, name, &template);
        }

        Ok(template)
    }

    fn compile(&self, name: &str, source_path: &Path) -> Result<Template> {
        self.compilations.fetch_add(1, Ordering::Relaxed);
        log::debug!("Compiling view '{}' from {}", name, source_path.display());
        compile_file(name, source_path)
    }

    fn load_fresh(&self, directory: &Path, name: &str, source_path: &Path) -> Option<Template> {
        let artifact = self.locate(directory, name)?;

        let fresh = match (modified(&artifact), modified(source_path)) {
            (Some(artifact_time), Some(source_time)) => artifact_time >= source_time,
            _ => false,
        };
        if !fresh {
            log::debug!("View cache artifact for '{}' is stale", name);
            return None;
        }

        let contents = match fs::read(&artifact) {
            Ok(contents) => contents,
            Err(e) => {
                log::debug!("View cache artifact {} unreadable: {}", artifact.display(), e);
                self.index.remove(name);
                return None;
            }
        };

        match serde_json::from_slice::<Template>(&contents) {
            Ok(template) => Some(template),
            Err(e) => {
                log::warn!("Discarding corrupt view cache artifact {}: {}", artifact.display(), e);
                self.index.remove(name);
                None
            }
        }
    }

    /// Artifact path for `name`, from the index or a scan of the directory
    fn locate(&self, directory: &Path, name: &str) -> Option<PathBuf> {
        if let Some(path) = self.index.get(name) {
            if path.is_file() {
                return Some(path.clone());
            }
        }

        let prefix = format!("{}.", md5_hex(name.as_bytes()));
        let found = fs::read_dir(directory)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_artifact_for(path, &prefix))
            .max_by_key(|path| modified(path));

        match &found {
            Some(path) => {
                self.index.insert(name.to_string(), path.clone());
            }
            None => {
                self.index.remove(name);
            }
        }
        found
    }

    /// Best effort: failures are logged and the render continues uncached
    fn store(&self, directory: &Path, name: &str, template: &Template) {
        let json = match serde_json::to_vec(template) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to serialize compiled view '{}': {}", name, e);
                return;
            }
        };

        let name_hash = md5_hex(name.as_bytes());
        let mut fingerprint_input = name.as_bytes().to_vec();
        fingerprint_input.extend_from_slice(&json);
        let file_name = format!("{}.{}.json", name_hash, md5_hex(&fingerprint_input));
        let target = directory.join(&file_name);
        let temp = directory.join(format!("{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let written = fs::create_dir_all(directory)
            .and_then(|_| fs::write(&temp, &json))
            .and_then(|_| fs::rename(&temp, &target));

        if let Err(e) = written {
            log::warn!(
                "Failed to write view cache artifact {}: {}",
                target.display(),
                e
            );
            let _ = fs::remove_file(&temp);
            return;
        }

        self.index.insert(name.to_string(), target.clone());
        self.remove_stale_siblings(directory, &format!("{}.", name_hash), &target);
    }

    fn remove_stale_siblings(&self, directory: &Path, prefix: &str, keep: &Path) {
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if path != keep && is_artifact_for(&path, prefix) {
                if let Err(e) = fs::remove_file(&path) {
                    log::debug!("Could not remove stale artifact {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Remove every artifact; returns how many files were deleted
    pub fn clear(&self) -> Result<usize> {
        self.index.clear();
        let directory = match &self.directory {
            Some(directory) if directory.is_dir() => directory,
            _ => return Ok(0),
        };

        let mut removed = 0;
        for entry in fs::read_dir(directory)? {
            let path = entry?.path();
            let is_artifact = path
                .file_name()
                .and_then(|f| f.to_str())
                .map_or(false, |f| f.ends_with(".json") && f.split('.').count() == 3);
            if is_artifact {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        log::info!("Cleared {} compiled view(s)", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
        }
    }
}

fn is_artifact_for(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|f| f.to_str())
        .map_or(false, |f| f.starts_with(prefix) && f.ends_with(".json"))
}
