// Deterministic commit message synthesis.
//
// A message reads `<Verb> <n> file(s) [<category>]: <files>[ <timestamp>]`,
// e.g. `Update 2 files [code]: a.py, b.py`. The same inputs always produce
// the same message; the timestamp is an explicit input.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::plan::ChangeType;
use crate::config::CommitConfig;

const ELLIPSIS: &str = "...";
const MAX_LISTED_FILES: usize = 4;
const LISTED_WHEN_ELIDED: usize = 3;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSettings {
    pub include_timestamp: bool,
    /// Maximum length in characters (Unicode scalar values).
    pub max_length: usize,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self::from(&CommitConfig::default())
    }
}

impl From<&CommitConfig> for MessageSettings {
    fn from(config: &CommitConfig) -> Self {
        Self { include_timestamp: config.include_timestamp, max_length: config.max_message_length }
    }
}

/// Coarse file category used to describe a commit.
///
/// Variant order is the tie-break order for [`dominant_category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Code,
    Config,
    Docs,
    Style,
    Test,
    Other,
}

impl FileCategory {
    const ALL: [FileCategory; 6] =
        [Self::Code, Self::Config, Self::Docs, Self::Style, Self::Test, Self::Other];

    pub fn label(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Config => "config",
            Self::Docs => "docs",
            Self::Style => "style",
            Self::Test => "tests",
            Self::Other => "other",
        }
    }
}

const CODE_EXTENSIONS: &[&str] =
    &["py", "js", "ts", "jsx", "tsx", "go", "rs", "java", "cpp", "c", "h"];
const CONFIG_EXTENSIONS: &[&str] = &["json", "yml", "yaml", "toml", "ini", "cfg"];
const DOCS_EXTENSIONS: &[&str] = &["md", "txt", "rst", "doc", "docx"];
const STYLE_EXTENSIONS: &[&str] = &["css", "scss", "less", "sass"];

/// Categorize one path. Extension rules are checked before name rules,
/// so `test_api.py` is code and `test_data.csv` is a test.
pub fn categorize(path: &str) -> FileCategory {
    let lower = path.to_lowercase();
    let file_name = lower.rsplit(['/', '\\']).next().unwrap_or(&lower);
    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (file_name, ""),
    };

    if CODE_EXTENSIONS.contains(&extension) {
        FileCategory::Code
    } else if CONFIG_EXTENSIONS.contains(&extension) {
        FileCategory::Config
    } else if DOCS_EXTENSIONS.contains(&extension) {
        FileCategory::Docs
    } else if STYLE_EXTENSIONS.contains(&extension) {
        FileCategory::Style
    } else if file_name.starts_with("test_") || stem.ends_with("_test") || lower.contains("test") {
        FileCategory::Test
    } else {
        FileCategory::Other
    }
}

/// Most frequent category; ties go to the earlier category.
pub fn dominant_category<S: AsRef<str>>(files: &[S]) -> FileCategory {
    let mut counts = [0usize; FileCategory::ALL.len()];
    for file in files {
        counts[categorize(file.as_ref()) as usize] += 1;
    }

    let mut best = FileCategory::Other;
    let mut best_count = 0;
    for category in FileCategory::ALL {
        let count = counts[category as usize];
        if count > best_count {
            best = category;
            best_count = count;
        }
    }
    best
}

fn file_summary<S: AsRef<str>>(files: &[S]) -> String {
    if files.len() <= MAX_LISTED_FILES {
        return files.iter().map(|file| file.as_ref()).collect::<Vec<&str>>().join(", ");
    }
    let mut listed: Vec<&str> =
        files.iter().take(LISTED_WHEN_ELIDED).map(|file| file.as_ref()).collect();

    listed.push(ELLIPSIS);
    listed.join(", ")
}

/// Build the commit message for a set of changed files.
pub fn generate<S: AsRef<str>>(
    change_type: ChangeType,
    files: &[S],
    settings: &MessageSettings,
    at: NaiveDateTime,
) -> String {
    let noun = if files.len() == 1 { "file" } else { "files" };
    let mut message = format!(
        "{} {} {} [{}]",
        change_type.prefix(),
        files.len(),
        noun,
        dominant_category(files).label()
    );

    if !files.is_empty() {
        message.push_str(": ");
        message.push_str(&file_summary(files));
    }

    if settings.include_timestamp {
        message.push_str(&format!(" [{}]", at.format(TIMESTAMP_FORMAT)));
    }

    truncate_message(&message, settings.max_length)
}

/// Cap a message at `max_chars` characters, marking the cut with `...`.
///
/// Counts characters rather than bytes so multi-byte names never split.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return message.chars().take(max_chars).collect();
    }

    let mut truncated: String = message.chars().take(max_chars - ELLIPSIS.len()).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
