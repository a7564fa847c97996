//! Text rendering of a task's chapters

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::ExportError;
use crate::task::{Chapter, ChapterStatus, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Text,
    Markdown,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Markdown => "md",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    #[serde(default)]
    pub format: ExportFormat,
    /// Skip non-completed chapters (with a marker) instead of refusing
    #[serde(default)]
    pub allow_partial: bool,
}

/// Rendered document plus what went into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body: String,
    pub chapter_count: usize,
    pub missing_count: usize,
}

pub fn render(task: &Task, options: &ExportOptions) -> Result<Rendered, ExportError> {
    let missing: Vec<usize> = task
        .chapters
        .iter()
        .filter(|chapter| chapter.status != ChapterStatus::Completed)
        .map(|chapter| chapter.index)
        .collect();

    let chapter_count = task.chapters.len() - missing.len();
    if chapter_count == 0 {
        return Err(ExportError::NothingToExport(task.id.clone()));
    }
    if !missing.is_empty() && !options.allow_partial {
        return Err(ExportError::Incomplete {
            task_id: task.id.clone(),
            missing,
        });
    }

    let mut chapters: Vec<&Chapter> = task.chapters.iter().collect();
    chapters.sort_by_key(|chapter| chapter.index);

    let mut body = String::new();
    match options.format {
        ExportFormat::Text => {
            let _ = write!(body, "{}\n\n", task.title);
            for chapter in chapters {
                let _ = write!(body, "{}\n\n", chapter.name);
                match chapter.content.as_deref() {
                    Some(content) if chapter.status == ChapterStatus::Completed => {
                        let _ = write!(body, "{}\n\n", content);
                    }
                    _ => {
                        let _ = write!(body, "{}\n\n", missing_marker(chapter));
                    }
                }
                body.push_str("---\n\n");
            }
        }
        ExportFormat::Markdown => {
            let _ = write!(body, "# {}\n\n", task.title);
            if let Some(author) = task.author.as_deref().filter(|a| !a.is_empty()) {
                let _ = write!(body, "*{}*\n\n", author);
            }
            for chapter in chapters {
                let _ = write!(body, "## {}\n\n", chapter.name);
                match chapter.content.as_deref() {
                    Some(content) if chapter.status == ChapterStatus::Completed => {
                        let _ = write!(body, "{}\n\n", content);
                    }
                    _ => {
                        let _ = write!(body, "> {}\n\n", missing_marker(chapter));
                    }
                }
            }
        }
    }

    Ok(Rendered {
        body,
        chapter_count,
        missing_count: missing.len(),
    })
}

fn missing_marker(chapter: &Chapter) -> String {
    match chapter.last_error.as_deref() {
        Some(error) => format!(
            "[missing chapter {}: {} - {}]",
            chapter.index + 1,
            chapter.status,
            error
        ),
        None => format!("[missing chapter {}: {}]", chapter.index + 1, chapter.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ChapterSpec, TaskDefaults, TaskSpec};

    fn sample_task() -> Task {
        let spec = TaskSpec::builder()
            .title("Book")
            .author("Ann")
            .chapters(vec![
                ChapterSpec::new("One", "/1"),
                ChapterSpec::new("Two", "/2"),
                ChapterSpec::new("Three", "/3"),
            ])
            .build();
        Task::from_spec("task_x".into(), spec, &TaskDefaults::default())
    }

    #[test]
    fn test_render_full_text_layout() {
        let mut task = sample_task();
        for (i, chapter) in task.chapters.iter_mut().enumerate() {
            chapter.complete(format!("body {}", i + 1));
        }

        let rendered = render(&task, &ExportOptions::default()).unwrap();
        assert_eq!(
            rendered.body,
            "Book\n\nOne\n\nbody 1\n\n---\n\nTwo\n\nbody 2\n\n---\n\nThree\n\nbody 3\n\n---\n\n"
        );
        assert_eq!(rendered.chapter_count, 3);
        assert_eq!(rendered.missing_count, 0);
    }

    #[test]
    fn test_partial_export_marks_missing_chapter() {
        let mut task = sample_task();
        task.chapters[0].complete("first".into());
        task.chapters[1].fail("timeout".into());
        task.chapters[2].complete("third".into());

        let options = ExportOptions {
            format: ExportFormat::Text,
            allow_partial: true,
        };
        let rendered = render(&task, &options).unwrap();

        assert!(rendered.body.contains("first"));
        assert!(rendered.body.contains("third"));
        assert!(rendered.body.contains("[missing chapter 2: failed - timeout]"));
        assert_eq!(rendered.chapter_count, 2);
        assert_eq!(rendered.missing_count, 1);
    }

    #[test]
    fn test_incomplete_export_rejected_without_partial() {
        let mut task = sample_task();
        task.chapters[0].complete("first".into());

        let err = render(&task, &ExportOptions::default()).unwrap_err();
        match err {
            ExportError::Incomplete { missing, .. } => assert_eq!(missing, vec![1, 2]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nothing_to_export() {
        let task = sample_task();
        let options = ExportOptions {
            allow_partial: true,
            ..Default::default()
        };
        assert!(matches!(
            render(&task, &options),
            Err(ExportError::NothingToExport(_))
        ));
    }

    #[test]
    fn test_markdown_layout() {
        let mut task = sample_task();
        task.chapters[0].complete("first".into());
        let options = ExportOptions {
            format: ExportFormat::Markdown,
            allow_partial: true,
        };

        let body = render(&task, &options).unwrap().body;
        assert!(body.starts_with("# Book\n\n*Ann*\n\n## One\n\nfirst\n\n"));
        assert!(body.contains("> [missing chapter 3: pending]"));
    }
}
