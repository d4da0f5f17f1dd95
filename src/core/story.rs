use serde::{Deserialize, Serialize};
use url::Url;

/// Boundary between two paragraphs of a generated story.
pub const PARAGRAPH_BREAK: &str = "\n\n";

/// Splits a story on blank-line boundaries.
///
/// `k` boundaries always give `k + 1` paragraphs, so a story without any
/// boundary (including the empty placeholder story) is one paragraph.
pub fn split_paragraphs(story: &str) -> Vec<String> {
    story.split(PARAGRAPH_BREAK).map(str::to_string).collect()
}

/// What to do with the segment before the first paragraph break.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TitleHandling {
    /// Treat it like every other paragraph.
    #[default]
    Illustrate,
    /// Render it as the title, without a summary or illustration.
    Heading,
}

impl TitleHandling {
    /// Separates the title from the paragraphs that get illustrated.
    ///
    /// A story with a single segment keeps it as a paragraph regardless.
    pub fn apply(self, mut paragraphs: Vec<String>) -> (Option<String>, Vec<String>) {
        match self {
            TitleHandling::Heading if paragraphs.len() > 1 => {
                let title = paragraphs.remove(0);
                (Some(title), paragraphs)
            }
            _ => (None, paragraphs),
        }
    }
}

/// A paragraph and the illustration generated for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub paragraph: String,
    pub summary: String,
    /// `None` when the summary or image call failed.
    pub illustration: Option<Url>,
}

/// Final result of a pipeline run, ready for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryOutput {
    Plain(String),
    Illustrated {
        title: Option<String>,
        pages: Vec<Page>,
    },
}

impl StoryOutput {
    pub fn pages(&self) -> &[Page] {
        match self {
            StoryOutput::Plain(_) => &[],
            StoryOutput::Illustrated { pages, .. } => pages,
        }
    }
}
