use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use quill_core::JobSnapshot;
use quill_logging::{quill_debug, quill_warn};
use tempfile::NamedTempFile;
use thiserror::Error;

const HEADER_FENCE: &str = "---";
const CHAPTER_EXTENSION: &str = "md";
const MAX_SLUG_LEN: usize = 60;

/// Produces the `generated_utc` header value.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct ArchiveSettings {
    pub dir: PathBuf,
    pub clock: Clock,
}

impl ArchiveSettings {
    /// Timestamps default to unix seconds; binaries usually install an RFC3339 clock.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            clock: Arc::new(|| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs().to_string())
                    .unwrap_or_default()
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive directory missing or not writable: {0}")]
    Dir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("chapter file {0} has no valid header")]
    MissingHeader(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedChapter {
    pub number: u32,
    pub title: String,
    pub tokens: u64,
    pub estimated_cost_usd: f64,
    pub generated_utc: String,
    pub content: String,
    pub path: PathBuf,
}

/// Durable home of completed chapters: one `NNN-slug.md` file per unit.
pub struct ChapterArchive {
    settings: ArchiveSettings,
}

impl ChapterArchive {
    pub fn new(settings: ArchiveSettings) -> Self {
        Self { settings }
    }

    /// Ensure the directory exists and is writable; create it if missing.
    pub fn ensure_dir(&self) -> Result<(), ArchiveError> {
        let dir = &self.settings.dir;
        if dir.exists() {
            let meta = fs::metadata(dir).map_err(|e| ArchiveError::Dir(e.to_string()))?;
            if !meta.is_dir() {
                return Err(ArchiveError::Dir("path is not a directory".into()));
            }
        } else {
            fs::create_dir_all(dir).map_err(|e| ArchiveError::Dir(e.to_string()))?;
        }
        NamedTempFile::new_in(dir).map_err(|e| ArchiveError::Dir(e.to_string()))?;
        Ok(())
    }

    /// Write a completed chapter, replacing any earlier file for the same unit.
    pub fn save(&self, title: &str, snapshot: &JobSnapshot) -> Result<PathBuf, ArchiveError> {
        self.ensure_dir()?;

        let filename = chapter_filename(snapshot.unit_number, title);
        let document = render_document(title, snapshot, &(self.settings.clock)());
        let target = self.settings.dir.join(&filename);

        let mut tmp = NamedTempFile::new_in(&self.settings.dir)?;
        tmp.write_all(document.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| ArchiveError::Io(e.error))?;

        self.remove_stale(snapshot.unit_number, &filename)?;
        quill_debug!("archived unit {} to {:?}", snapshot.unit_number, target);
        Ok(target)
    }

    /// Read every archived chapter, ascending by number. Unreadable files are skipped.
    pub fn load(&self) -> Result<Vec<ArchivedChapter>, ArchiveError> {
        let dir = &self.settings.dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut chapters = Vec::new();
        for path in chapter_files(dir)? {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) => {
                    quill_warn!("skipping unreadable {:?}: {}", path, err);
                    continue;
                }
            };
            match parse_document(&text, &path) {
                Ok(chapter) => chapters.push(chapter),
                Err(err) => quill_warn!("skipping {:?}: {}", path, err),
            }
        }
        chapters.sort_by_key(|chapter| chapter.number);
        Ok(chapters)
    }

    fn remove_stale(&self, number: u32, keep: &str) -> Result<(), ArchiveError> {
        let prefix = number_prefix(number);
        for path in chapter_files(&self.settings.dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name != keep && name.starts_with(&prefix) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn chapter_files(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(CHAPTER_EXTENSION))
        .collect();
    paths.sort();
    Ok(paths)
}

fn number_prefix(number: u32) -> String {
    format!("{number:03}-")
}

/// `{number:03}-{slug}.md`, safe on every common filesystem.
pub fn chapter_filename(number: u32, title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.chars().count() > MAX_SLUG_LEN {
        slug = slug.chars().take(MAX_SLUG_LEN).collect();
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    format!("{}{slug}.{CHAPTER_EXTENSION}", number_prefix(number))
}

fn render_document(title: &str, snapshot: &JobSnapshot, generated_utc: &str) -> String {
    let title = title.replace(['\r', '\n'], " ");
    format!(
        "{HEADER_FENCE}\nnumber: {number}\ntitle: {title}\ntokens: {tokens}\nestimated_cost_usd: {cost}\ngenerated_utc: {generated_utc}\n{HEADER_FENCE}\n\n{content}",
        number = snapshot.unit_number,
        tokens = snapshot.tokens,
        cost = snapshot.estimated_cost_usd,
        content = snapshot.content,
    )
}

fn parse_document(text: &str, path: &Path) -> Result<ArchivedChapter, ArchiveError> {
    let missing = || ArchiveError::MissingHeader(path.display().to_string());

    let rest = text
        .strip_prefix(HEADER_FENCE)
        .and_then(|r| r.strip_prefix('\n'))
        .ok_or_else(missing)?;
    let closing = format!("\n{HEADER_FENCE}\n");
    let end = rest.find(&closing).ok_or_else(missing)?;
    let header = &rest[..end];
    let body = &rest[end + closing.len()..];
    // Exactly one separator line; the content itself is stored verbatim.
    let content = body.strip_prefix('\n').unwrap_or(body);

    let mut number = None;
    let mut chapter = ArchivedChapter {
        number: 0,
        title: String::new(),
        tokens: 0,
        estimated_cost_usd: 0.0,
        generated_utc: String::new(),
        content: content.to_string(),
        path: path.to_path_buf(),
    };
    for line in header.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim();
            match key.trim() {
                "number" => number = value.parse::<u32>().ok(),
                "title" => chapter.title = value.to_string(),
                "tokens" => chapter.tokens = value.parse().unwrap_or(0),
                "estimated_cost_usd" => chapter.estimated_cost_usd = value.parse().unwrap_or(0.0),
                "generated_utc" => chapter.generated_utc = value.to_string(),
                _ => {}
            }
        }
    }
    chapter.number = number.filter(|n| *n > 0).ok_or_else(missing)?;
    Ok(chapter)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use quill_core::{JobSnapshot, JobStatus};

    use super::{chapter_filename, parse_document, render_document};

    #[test]
    fn filenames_are_numbered_slugs() {
        assert_eq!(chapter_filename(1, "The Storm: Part I"), "001-the-storm-part-i.md");
        assert_eq!(chapter_filename(12, "  ??  "), "012-untitled.md");
        assert_eq!(chapter_filename(3, "Café/Noir"), "003-café-noir.md");
    }

    #[test]
    fn document_round_trip_keeps_content_verbatim() {
        let snapshot = JobSnapshot {
            unit_number: 4,
            attempt: 1,
            status: JobStatus::Completed,
            content: "\n  indented start\n---\nend with spaces  ".to_string(),
            progress: 1.0,
            tokens: 9,
            estimated_cost_usd: 0.25,
            error_detail: None,
            stage: None,
        };
        let doc = render_document("Four\nLines", &snapshot, "2026-01-01T00:00:00Z");
        let chapter = parse_document(&doc, Path::new("004-four.md")).unwrap();
        assert_eq!(chapter.number, 4);
        assert_eq!(chapter.title, "Four Lines");
        assert_eq!(chapter.tokens, 9);
        assert_eq!(chapter.estimated_cost_usd, 0.25);
        assert_eq!(chapter.generated_utc, "2026-01-01T00:00:00Z");
        assert_eq!(chapter.content, snapshot.content);
    }

    #[test]
    fn documents_without_header_are_rejected() {
        assert!(parse_document("just text", Path::new("x.md")).is_err());
        assert!(parse_document("---\ntitle: x\n---\n\nbody", Path::new("x.md")).is_err());
    }
}
