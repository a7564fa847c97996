use thiserror::Error;

use super::models::TaskSpec;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("chapter list must not be empty")]
    NoChapters,
    #[error("task has {0} chapters, limit is {1}")]
    TooManyChapters(usize, usize),
    #[error("chapter {0} has an empty source reference")]
    EmptyChapterSource(usize),
    #[error("concurrency must be between 1 and {0}")]
    InvalidConcurrency(usize),
}

/// Upper bounds a spec is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLimits {
    pub max_chapters: usize,
    pub max_concurrency: usize,
}

/// Check a spec before it enters the registry
pub fn validate_spec(spec: &TaskSpec, limits: &TaskLimits) -> Result<(), ValidationError> {
    if spec.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }

    if spec.chapters.is_empty() {
        return Err(ValidationError::NoChapters);
    }

    if spec.chapters.len() > limits.max_chapters {
        return Err(ValidationError::TooManyChapters(
            spec.chapters.len(),
            limits.max_chapters,
        ));
    }

    if let Some(concurrency) = spec.concurrency {
        if concurrency == 0 || concurrency > limits.max_concurrency {
            return Err(ValidationError::InvalidConcurrency(limits.max_concurrency));
        }
    }

    if let Some(index) = spec
        .chapters
        .iter()
        .position(|chapter| chapter.source_ref.trim().is_empty())
    {
        return Err(ValidationError::EmptyChapterSource(index));
    }

    Ok(())
}
