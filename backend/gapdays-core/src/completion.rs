// src/completion.rs
//! Which employees already have a report on disk.
//!
//! The run manifest (one JSON line per rendered employee) is the primary record.
//! Artifact filenames are scanned as well, so output produced before the manifest
//! existed, or copied in by hand, is still recognised.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::classify::Category;
use crate::error::{io_context, PipelineError};
use crate::record::EmployeeId;

// --- Completion Cache ---

/// Point-in-time snapshot of reported employee ids for one report area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionCache {
    ids: HashSet<EmployeeId>,
    area_exists: bool,
}

impl CompletionCache {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            area_exists: true,
        }
    }

    /// Lists `output_root/sub_area` and collects every id the pattern finds in the
    /// artifact names (extension stripped). A missing directory is an empty cache.
    /// Never writes to the filesystem.
    pub fn scan(output_root: &Path, sub_area: &str, pattern: &Regex) -> Result<Self, PipelineError> {
        let area = output_root.join(sub_area);
        if !area.is_dir() {
            info!("Report area {:?} does not exist yet; completion cache is empty", area);
            return Ok(Self::default());
        }

        let entries = fs::read_dir(&area)
            .map_err(|e| io_context(e, format!("Failed to read report area: {:?}", area)))?;

        let mut ids = HashSet::new();
        for entry_result in entries {
            let entry = entry_result.map_err(|e| io_context(e, "Failed to read directory entry"))?;
            let path = entry.path();
            if let Some(stem) = path.file_stem().and_then(|n| n.to_str()) {
                for id in extract_ids(stem, pattern) {
                    debug!("Found existing artifact for {} ({:?})", id, path);
                    ids.insert(id);
                }
            }
        }

        info!("Completion cache for {:?}: {} employees already reported", area, ids.len());
        Ok(Self {
            ids,
            area_exists: true,
        })
    }

    pub fn extend<I: IntoIterator<Item = EmployeeId>>(&mut self, ids: I) {
        self.ids.extend(ids);
    }

    pub fn contains(&self, employee_id: &str) -> bool {
        self.ids.contains(employee_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// False when the report area was absent at scan time.
    pub fn area_exists(&self) -> bool {
        self.area_exists
    }

    pub fn ids(&self) -> &HashSet<EmployeeId> {
        &self.ids
    }
}

/// Every pattern match in a file name. The extension is expected to be stripped.
pub fn extract_ids(file_stem: &str, pattern: &Regex) -> Vec<EmployeeId> {
    pattern
        .find_iter(file_stem)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Classified ids not yet reported, in the order given. An empty cache means
/// everything is pending: nothing has been reported yet, or the area is new.
pub fn pending_ids(classified: &[EmployeeId], cache: &CompletionCache) -> Vec<EmployeeId> {
    if cache.is_empty() {
        debug!("Completion cache empty; all {} employees pending", classified.len());
        return classified.to_vec();
    }
    let pending: Vec<EmployeeId> = classified
        .iter()
        .filter(|id| !cache.contains(id))
        .cloned()
        .collect();
    info!(
        "{} of {} employees pending ({} already reported)",
        pending.len(),
        classified.len(),
        classified.len() - pending.len()
    );
    pending
}

// --- Run Manifest ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub category: Category,
    pub employee_id: EmployeeId,
    pub status: ReportStatus,
    pub artifact: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only JSON-lines ledger of rendered employees.
#[derive(Debug, Clone)]
pub struct RunManifest {
    path: PathBuf,
}

impl RunManifest {
    pub fn at(output_root: &Path, file_name: &str) -> Self {
        Self {
            path: output_root.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ManifestEntry) -> Result<(), PipelineError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                io_context(e, format!("Failed to create manifest directory: {:?}", parent))
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_context(e, format!("Failed to open manifest: {:?}", self.path)))?;
        let mut line = serde_json::to_string(entry)?;
        if !ends_with_newline(&mut file)
            .map_err(|e| io_context(e, format!("Failed to read manifest: {:?}", self.path)))?
        {
            // Terminate a torn last line so this entry starts on its own.
            warn!("Manifest {:?} ends mid-line; starting a new line", self.path);
            line.insert(0, '\n');
        }
        writeln!(file, "{}", line)
            .map_err(|e| io_context(e, format!("Failed to append to manifest: {:?}", self.path)))?;
        Ok(())
    }

    /// All readable entries. A missing manifest has none; malformed lines are
    /// skipped with a warning.
    pub fn entries(&self) -> Result<Vec<ManifestEntry>, PipelineError> {
        if !self.path.exists() {
            debug!("No manifest at {:?}", self.path);
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)
            .map_err(|e| io_context(e, format!("Failed to open manifest: {:?}", self.path)))?;

        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .map_err(|e| io_context(e, format!("Failed to read manifest: {:?}", self.path)))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ManifestEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    "Skipping malformed manifest line {} in {:?}: {}",
                    line_no + 1,
                    self.path,
                    e
                ),
            }
        }
        Ok(entries)
    }

    pub fn completed_ids(&self, category: Category) -> Result<HashSet<EmployeeId>, PipelineError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.category == category && e.status == ReportStatus::Completed)
            .map(|e| e.employee_id)
            .collect())
    }
}

/// True for an empty file or one whose last byte is a newline.
fn ends_with_newline(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Manifest entries for `category` unioned with the filename scan of its area.
pub fn load_completion_cache(
    output_root: &Path,
    sub_area: &str,
    category: Category,
    manifest: &RunManifest,
    pattern: &Regex,
) -> Result<CompletionCache, PipelineError> {
    let mut cache = CompletionCache::scan(output_root, sub_area, pattern)?;
    let from_manifest = manifest.completed_ids(category)?;
    if !from_manifest.is_empty() {
        debug!(
            "Manifest lists {} completed {} reports",
            from_manifest.len(),
            category
        );
    }
    cache.extend(from_manifest);
    Ok(cache)
}
