//! Export of downloaded chapters into a single document.
//!
//! [`render`] builds the document in memory; [`Exporter`] renders and hands the
//! result to an [`ExportSink`] such as [`ArtifactStore`].

mod render;
mod sink;

pub use render::{ExportFormat, ExportOptions, Rendered, render};
pub use sink::{Artifact, ArtifactHandle, ArtifactStore, ExportSink};

use std::sync::Arc;
use thiserror::Error;

use crate::task::Task;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Task {task_id} is incomplete, missing chapters {missing:?}")]
    Incomplete { task_id: String, missing: Vec<usize> },

    #[error("Task {0} has no completed chapters")]
    NothingToExport(String),

    #[error("Object store error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Clone)]
pub struct Exporter {
    sink: Arc<dyn ExportSink>,
}

impl Exporter {
    pub fn new(sink: Arc<dyn ExportSink>) -> Self {
        Self { sink }
    }

    /// Render `task` and write it to the sink. Never touches task state.
    pub async fn export(&self, task: &Task, options: &ExportOptions) -> Result<ArtifactHandle> {
        let rendered = render(task, options)?;
        let artifact = Artifact {
            task_id: task.id.clone(),
            file_name: task.settings.file_name.clone(),
            format: options.format,
            body: rendered.body,
            chapter_count: rendered.chapter_count,
            missing_count: rendered.missing_count,
        };
        self.sink.write(artifact).await
    }
}
