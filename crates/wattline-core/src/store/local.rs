// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Wattline.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use super::ValueStore;
use crate::errors::{StoreError, StoreResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use wattline_types::{ComponentKey, CorrectedState};

/// Fast local backend: one small text record per field under
/// `<root>/<class segment>/<id>/<field>`.
///
/// `<id>` is a symbolic link to a numbered generation directory
/// (`.<id>.<n>`). A commit writes generation `n + 1` in full and then
/// replaces the link with a single rename, so a reader that resolves the
/// link once sees every field of the same commit. Generation names are
/// never reused.
#[derive(Debug)]
pub struct LocalRecordStore {
    key: ComponentKey,
    parent: PathBuf,
    link: PathBuf,
    prepared: bool,
    generation: u64,
    current: Option<String>,
    staged: Option<CorrectedState>,
}

impl LocalRecordStore {
    pub fn new(root: &Path, key: ComponentKey) -> Self {
        let parent = root.join(key.class.topic_segment());
        Self {
            key,
            link: parent.join(key.id.to_string()),
            parent,
            prepared: false,
            generation: 0,
            current: None,
            staged: None,
        }
    }

    /// Record directory as readers address it
    pub fn dir(&self) -> &Path {
        &self.link
    }

    fn generation_prefix(&self) -> String {
        format!(".{}.", self.key.id)
    }

    /// Pick up the generation already on disk and drop leftovers of
    /// interrupted commits.
    fn prepare(&mut self) -> StoreResult<()> {
        if self.prepared {
            return Ok(());
        }
        fs::create_dir_all(&self.parent).map_err(io_error(&self.parent))?;
        // A plain directory left by an older layout cannot be swapped.
        if let Ok(meta) = fs::symlink_metadata(&self.link)
            && meta.is_dir()
        {
            fs::remove_dir_all(&self.link).map_err(io_error(&self.link))?;
        }

        let prefix = self.generation_prefix();
        self.current = fs::read_link(&self.link)
            .ok()
            .and_then(|target| target.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|name| name.starts_with(&prefix));
        self.generation = self
            .current
            .as_deref()
            .and_then(|name| name.strip_prefix(&prefix))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);

        let entries = fs::read_dir(&self.parent).map_err(io_error(&self.parent))?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && self.current.as_deref() != Some(name.as_str()) {
                remove_path(&entry.path())?;
            }
        }

        self.prepared = true;
        Ok(())
    }

    fn write_generation(dir: &Path, state: &CorrectedState) -> StoreResult<()> {
        remove_path(dir)?;
        fs::create_dir(dir).map_err(io_error(dir))?;
        for field in state.fields() {
            let path = dir.join(field.name);
            fs::write(&path, field.value.to_string()).map_err(io_error(&path))?;
        }
        Ok(())
    }

    fn swap_link(&self, generation: &str) -> StoreResult<()> {
        let temp_link = self.parent.join(format!(".{}.link", self.key.id));
        match fs::remove_file(&temp_link) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::Io {
                    path: temp_link,
                    source,
                });
            }
        }
        link_generation(generation, &temp_link).map_err(io_error(&temp_link))?;
        fs::rename(&temp_link, &self.link).map_err(|source| {
            let _ = fs::remove_file(&temp_link);
            StoreError::Io {
                path: self.link.clone(),
                source,
            }
        })
    }
}

impl ValueStore for LocalRecordStore {
    fn key(&self) -> ComponentKey {
        self.key
    }

    fn set(&mut self, state: CorrectedState) {
        self.staged = Some(state);
    }

    fn update(&mut self) -> StoreResult<()> {
        if self.staged.is_none() {
            return Ok(());
        }
        self.prepare()?;

        let generation = self.generation + 1;
        let next = format!("{}{generation}", self.generation_prefix());
        let staging = self.parent.join(&next);

        let written = match &self.staged {
            Some(state) => Self::write_generation(&staging, state),
            None => Ok(()),
        };
        if let Err(e) = written.and_then(|()| self.swap_link(&next)) {
            if let Err(cleanup) = remove_path(&staging) {
                warn!("⚠️ Could not remove staging records for {}: {}", self.key, cleanup);
            }
            return Err(e);
        }

        self.generation = generation;
        if let Some(previous) = self.current.replace(next)
            && let Err(e) = remove_path(&self.parent.join(&previous))
        {
            debug!("Stale records for {} left in place: {}", self.key, e);
        }
        trace!("{} records written to {}", self.key, self.link.display());
        Ok(())
    }

    fn staged(&self) -> Option<&CorrectedState> {
        self.staged.as_ref()
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + use<> {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

fn remove_path(path: &Path) -> StoreResult<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(io_error(path))
}

#[cfg(unix)]
fn link_generation(generation: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(generation, link)
}

#[cfg(windows)]
fn link_generation(generation: &str, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(generation, link)
}
