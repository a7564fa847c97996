//! Derived task counters.
//!
//! Counters are always recomputed from the full chapter list instead of being
//! incremented by workers, so concurrent completions can never drift them.

use serde::{Deserialize, Serialize};

use super::models::{Chapter, ChapterStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub completed_count: usize,
    #[serde(default)]
    pub failed_count: usize,
    #[serde(default)]
    pub pending_count: usize,
    #[serde(default)]
    pub downloading_count: usize,
    #[serde(default)]
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub progress_percent: u8,
}

impl Progress {
    pub fn total(&self) -> usize {
        self.completed_count + self.failed_count + self.pending_count + self.downloading_count
    }
}

pub fn aggregate(chapters: &[Chapter]) -> Progress {
    let mut progress = Progress::default();

    for chapter in chapters {
        match chapter.status {
            ChapterStatus::Completed => {
                progress.completed_count += 1;
                progress.downloaded_bytes += chapter.size;
            }
            ChapterStatus::Failed => progress.failed_count += 1,
            ChapterStatus::Pending => progress.pending_count += 1,
            ChapterStatus::Downloading => progress.downloading_count += 1,
        }
        progress.total_bytes += chapter.size;
    }

    if !chapters.is_empty() {
        let percent = (progress.completed_count as f64 / chapters.len() as f64) * 100.0;
        progress.progress_percent = percent.round() as u8;
    }

    progress
}
