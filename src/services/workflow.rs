use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

use crate::core::error::GenerationError;
use crate::core::selection::Selection;
use crate::core::story::{split_paragraphs, Page, StoryOutput, TitleHandling};
use crate::services::image::ImageGenerator;
use crate::services::llm::TextGenerator;
use crate::services::prompt::{
    build_image_prompt, build_story_prompt, build_summary_prompt, STORY_SYSTEM_PROMPT,
    SUMMARY_SYSTEM_PROMPT,
};
use crate::ui::{Presenter, Stage};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// How many paragraphs are summarized/illustrated at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Skip every remaining call after the first rejected credential.
    #[serde(default)]
    pub abort_on_auth_error: bool,
    #[serde(default)]
    pub title_handling: TitleHandling,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            abort_on_auth_error: false,
            title_handling: TitleHandling::default(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

enum PipelineState {
    BuildingStory,
    Splitting {
        story: String,
        style: String,
    },
    Summarizing {
        title: Option<String>,
        paragraphs: Vec<String>,
        style: String,
    },
    Illustrating {
        title: Option<String>,
        paragraphs: Vec<String>,
        summaries: Vec<String>,
        style: String,
    },
    Done(StoryOutput),
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            PipelineState::BuildingStory => "building story",
            PipelineState::Splitting { .. } => "splitting",
            PipelineState::Summarizing { .. } => "summarizing",
            PipelineState::Illustrating { .. } => "illustrating",
            PipelineState::Done(_) => "done",
        }
    }
}

/// Per-run state shared by every call of one pipeline run.
struct RunContext<'a> {
    selection: &'a Selection,
    presenter: &'a dyn Presenter,
    auth_failed: AtomicBool,
}

/// Turns a [`Selection`] into a story, optionally illustrated page by page.
///
/// Failed calls never abort a run: each one is reported to the presenter and
/// replaced by an empty placeholder, so every sequence keeps its length and
/// order.
pub struct StoryPipeline {
    config: PipelineConfig,
    text: Box<dyn TextGenerator>,
    image: Box<dyn ImageGenerator>,
}

impl StoryPipeline {
    pub fn new(
        config: PipelineConfig,
        text: Box<dyn TextGenerator>,
        image: Box<dyn ImageGenerator>,
    ) -> Self {
        Self { config, text, image }
    }

    pub async fn run(&self, selection: &Selection, presenter: &dyn Presenter) -> StoryOutput {
        let ctx = RunContext {
            selection,
            presenter,
            auth_failed: AtomicBool::new(false),
        };

        let mut state = PipelineState::BuildingStory;
        loop {
            info!("Pipeline state: {}", state.name());
            state = match state {
                PipelineState::Done(output) => {
                    let pages = output.pages();
                    let unillustrated = pages.iter().filter(|p| p.illustration.is_none()).count();
                    if unillustrated > 0 {
                        warn!("{} of {} pages have no illustration", unillustrated, pages.len());
                    }
                    presenter.render(&output);
                    return output;
                }
                other => self.step(&ctx, other).await,
            };
        }
    }

    async fn step(&self, ctx: &RunContext<'_>, state: PipelineState) -> PipelineState {
        match state {
            PipelineState::BuildingStory => {
                ctx.presenter.begin(&Stage::Story);
                let prompt = build_story_prompt(ctx.selection);
                let story = self.text_call(ctx, STORY_SYSTEM_PROMPT, &prompt).await;
                ctx.presenter.end(&Stage::Story);

                match ctx.selection.image_style() {
                    Some(style) => PipelineState::Splitting {
                        story,
                        style: style.to_string(),
                    },
                    None => PipelineState::Done(StoryOutput::Plain(story)),
                }
            }
            PipelineState::Splitting { story, style } => {
                ctx.presenter.begin(&Stage::Images);
                let (title, paragraphs) =
                    self.config.title_handling.apply(split_paragraphs(&story));
                info!("Story split into {} paragraphs", paragraphs.len());
                PipelineState::Summarizing { title, paragraphs, style }
            }
            PipelineState::Summarizing { title, paragraphs, style } => {
                let summaries = fan_out(&paragraphs, self.config.concurrency, |paragraph| {
                    self.summarize(ctx, paragraph)
                })
                .await;
                PipelineState::Illustrating { title, paragraphs, summaries, style }
            }
            PipelineState::Illustrating { title, paragraphs, summaries, style } => {
                let illustrations = fan_out(&summaries, self.config.concurrency, |summary| {
                    self.illustrate(ctx, summary, &style)
                })
                .await;
                ctx.presenter.end(&Stage::Images);

                let pages = paragraphs
                    .into_iter()
                    .zip(summaries)
                    .zip(illustrations)
                    .map(|((paragraph, summary), illustration)| Page {
                        paragraph,
                        summary,
                        illustration,
                    })
                    .collect();
                PipelineState::Done(StoryOutput::Illustrated { title, pages })
            }
            done @ PipelineState::Done(_) => done,
        }
    }

    async fn summarize(&self, ctx: &RunContext<'_>, paragraph: &str) -> String {
        let prompt = build_summary_prompt(paragraph);
        self.text_call(ctx, SUMMARY_SYSTEM_PROMPT, &prompt).await
    }

    async fn illustrate(&self, ctx: &RunContext<'_>, summary: &str, style: &str) -> Option<Url> {
        let prompt = build_image_prompt(summary, style);
        if self.skipping(ctx) {
            return None;
        }
        if ctx.selection.show_diagnostics() {
            ctx.presenter.diagnostics(&prompt, self.image.model());
        }

        let stage = Stage::Image { prompt: prompt.clone() };
        ctx.presenter.begin(&stage);
        let result = self.image.generate_image(&prompt).await;
        ctx.presenter.end(&stage);

        match result {
            Ok(url) => {
                debug!("Illustration ready: {}", url);
                Some(url)
            }
            Err(e) => {
                self.report(ctx, &e);
                None
            }
        }
    }

    async fn text_call(&self, ctx: &RunContext<'_>, system: &str, prompt: &str) -> String {
        if self.skipping(ctx) {
            return String::new();
        }
        if ctx.selection.show_diagnostics() {
            ctx.presenter.diagnostics(prompt, self.text.model());
        }

        match self.text.generate_text(system, prompt).await {
            Ok(text) => text,
            Err(e) => {
                self.report(ctx, &e);
                String::new()
            }
        }
    }

    fn skipping(&self, ctx: &RunContext<'_>) -> bool {
        self.config.abort_on_auth_error && ctx.auth_failed.load(Ordering::SeqCst)
    }

    fn report(&self, ctx: &RunContext<'_>, error: &GenerationError) {
        warn!("Generation failed, using placeholder: {}", error);
        if error.is_authentication() {
            let already_failed = ctx.auth_failed.swap(true, Ordering::SeqCst);
            if already_failed && self.config.abort_on_auth_error {
                return;
            }
        }
        ctx.presenter.notice(error);
    }
}

/// Runs `f` over `items` with at most `concurrency` calls in flight and
/// returns the results in item order, whatever order they complete in.
async fn fan_out<'a, I, T, F, Fut>(items: &'a [I], concurrency: usize, f: F) -> Vec<T>
where
    F: Fn(&'a I) -> Fut,
    Fut: Future<Output = T>,
    T: Default,
{
    let mut slots: Vec<Option<T>> = (0..items.len()).map(|_| None).collect();

    let mut results = stream::iter(items.iter().enumerate())
        .map(|(i, item)| {
            let fut = f(item);
            async move { (i, fut.await) }
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((i, value)) = results.next().await {
        slots[i] = Some(value);
    }

    slots.into_iter().map(Option::unwrap_or_default).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GenerationResult;
    use crate::core::selection::tests::fantasy_selection;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn entries(journal: &Journal, prefix: &str) -> Vec<String> {
        journal
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    #[derive(Debug)]
    struct MockTextGenerator {
        journal: Journal,
        story: GenerationResult<String>,
        summary_error: Option<GenerationError>,
    }

    impl MockTextGenerator {
        fn new(journal: &Journal, story: GenerationResult<String>) -> Self {
            Self {
                journal: journal.clone(),
                story,
                summary_error: None,
            }
        }
    }

    #[async_trait]
    impl TextGenerator for MockTextGenerator {
        fn model(&self) -> &str {
            "gpt-3.5-turbo"
        }

        async fn generate_text(&self, system: &str, prompt: &str) -> GenerationResult<String> {
            self.journal.lock().unwrap().push(format!("text:{}", prompt));

            if system == STORY_SYSTEM_PROMPT {
                return self.story.clone();
            }
            assert_eq!(system, SUMMARY_SYSTEM_PROMPT);
            if let Some(err) = &self.summary_error {
                return Err(err.clone());
            }

            let paragraph = prompt.split_once("\n\n").map(|(_, p)| p).unwrap_or_default();
            if paragraph.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.journal.lock().unwrap().push(format!("done:{}", paragraph));
            Ok(format!("summary of {}", paragraph))
        }
    }

    #[derive(Debug)]
    struct MockImageGenerator {
        journal: Journal,
        fail_when: Option<(&'static str, GenerationError)>,
    }

    #[async_trait]
    impl ImageGenerator for MockImageGenerator {
        fn model(&self) -> &str {
            "dall-e-2"
        }

        async fn generate_image(&self, prompt: &str) -> GenerationResult<Url> {
            let n = {
                let mut journal = self.journal.lock().unwrap();
                journal.push(format!("image:{}", prompt));
                journal.iter().filter(|e| e.starts_with("image:")).count()
            };
            if let Some((needle, err)) = &self.fail_when {
                if prompt.contains(needle) {
                    return Err(err.clone());
                }
            }
            Ok(Url::parse(&format!("https://img.test/{}.png", n)).unwrap())
        }
    }

    struct RecordingPresenter {
        journal: Journal,
        rendered: Mutex<Vec<StoryOutput>>,
    }

    impl RecordingPresenter {
        fn new(journal: &Journal) -> Self {
            Self {
                journal: journal.clone(),
                rendered: Mutex::new(Vec::new()),
            }
        }
    }

    impl Presenter for RecordingPresenter {
        fn begin(&self, stage: &Stage) {
            self.journal.lock().unwrap().push(format!("begin:{}", stage));
        }
        fn end(&self, stage: &Stage) {
            self.journal.lock().unwrap().push(format!("end:{}", stage));
        }
        fn diagnostics(&self, prompt: &str, model: &str) {
            let mut journal = self.journal.lock().unwrap();
            journal.push(format!("prompt:{}", prompt));
            journal.push(format!("model:{}", model));
        }
        fn notice(&self, error: &GenerationError) {
            self.journal.lock().unwrap().push(format!("notice:{}", error.notice()));
        }
        fn render(&self, output: &StoryOutput) {
            self.rendered.lock().unwrap().push(output.clone());
        }
    }

    fn pipeline(
        config: PipelineConfig,
        text: MockTextGenerator,
        journal: &Journal,
        fail_when: Option<(&'static str, GenerationError)>,
    ) -> StoryPipeline {
        let image = MockImageGenerator { journal: journal.clone(), fail_when };
        StoryPipeline::new(config, Box::new(text), Box::new(image))
    }

    fn auth_error() -> GenerationError {
        GenerationError::Authentication("Incorrect API key provided".to_string())
    }

    #[tokio::test]
    async fn test_plain_story_is_rendered_verbatim() {
        let journal = Journal::default();
        let story = "The Fox and the Map\n\nOnce upon a time...".to_string();
        let text = MockTextGenerator::new(&journal, Ok(story.clone()));
        let presenter = RecordingPresenter::new(&journal);

        let output = pipeline(PipelineConfig::default(), text, &journal, None)
            .run(&fantasy_selection(false), &presenter)
            .await;

        let calls = entries(&journal, "text:");
        assert_eq!(calls.len(), 1);
        for needle in ["Fantasy", "Animals", "Forest", "Friendship", "Quests"] {
            assert!(calls[0].contains(needle), "missing {}", needle);
        }
        assert_eq!(calls[0].matches("6-year-old").count(), 2);
        assert!(entries(&journal, "image:").is_empty());
        assert!(entries(&journal, "prompt:").is_empty());

        assert_eq!(output, StoryOutput::Plain(story.clone()));
        assert_eq!(*presenter.rendered.lock().unwrap(), vec![StoryOutput::Plain(story)]);
    }

    #[tokio::test]
    async fn test_diagnostics_precede_each_call() {
        let journal = Journal::default();
        let text = MockTextGenerator::new(&journal, Ok("Title\n\nPara1".to_string()));
        let presenter = RecordingPresenter::new(&journal);
        let selection = Selection::builder()
            .choose_named("genre", "Fantasy")
            .unwrap()
            .choose_named("main character", "Animals")
            .unwrap()
            .choose_named("setting", "Forest")
            .unwrap()
            .choose_named("theme", "Friendship")
            .unwrap()
            .choose_named("plot device", "Quests")
            .unwrap()
            .age(6)
            .unwrap()
            .show_diagnostics(true)
            .image_style("Cartoon")
            .unwrap()
            .build()
            .unwrap();

        pipeline(PipelineConfig::default(), text, &journal, None)
            .run(&selection, &presenter)
            .await;

        let log = journal.lock().unwrap().clone();
        let call_positions: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, e)| e.starts_with("text:") || e.starts_with("image:"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(call_positions.len(), 5);

        for i in call_positions {
            let (_, sent) = log[i].split_once(':').unwrap();
            let model = if log[i].starts_with("text:") { "gpt-3.5-turbo" } else { "dall-e-2" };
            let diag = log[..i]
                .iter()
                .rposition(|e| e.starts_with("prompt:"))
                .unwrap();
            assert_eq!(log[diag], format!("prompt:{}", sent));
            assert_eq!(log[diag + 1], format!("model:{}", model));
        }
    }

    #[tokio::test]
    async fn test_illustrated_story_keeps_title_as_paragraph() {
        let journal = Journal::default();
        let text = MockTextGenerator::new(&journal, Ok("Title\n\nPara1\n\nPara2".to_string()));
        let presenter = RecordingPresenter::new(&journal);

        let output = pipeline(PipelineConfig::default(), text, &journal, None)
            .run(&fantasy_selection(true), &presenter)
            .await;

        assert_eq!(entries(&journal, "text:").len(), 4);
        assert_eq!(
            entries(&journal, "image:"),
            vec![
                "summary of Title In the style of Cartoon art.",
                "summary of Para1 In the style of Cartoon art.",
                "summary of Para2 In the style of Cartoon art.",
            ]
        );

        let StoryOutput::Illustrated { title, pages } = output else {
            panic!("expected illustrated output");
        };
        assert_eq!(title, None);
        let paragraphs: Vec<&str> = pages.iter().map(|p| p.paragraph.as_str()).collect();
        assert_eq!(paragraphs, vec!["Title", "Para1", "Para2"]);
        assert_eq!(pages[2].illustration.as_ref().unwrap().as_str(), "https://img.test/3.png");
    }

    #[tokio::test]
    async fn test_illustrated_story_with_title_heading() {
        let journal = Journal::default();
        let text = MockTextGenerator::new(&journal, Ok("Title\n\nPara1\n\nPara2".to_string()));
        let presenter = RecordingPresenter::new(&journal);
        let config = PipelineConfig {
            title_handling: TitleHandling::Heading,
            ..Default::default()
        };

        let output = pipeline(config, text, &journal, None)
            .run(&fantasy_selection(true), &presenter)
            .await;

        // one story call plus one summary per paragraph
        assert_eq!(entries(&journal, "text:").len(), 3);
        assert_eq!(entries(&journal, "image:").len(), 2);

        let StoryOutput::Illustrated { title, pages } = &output else {
            panic!("expected illustrated output");
        };
        assert_eq!(title.as_deref(), Some("Title"));
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].paragraph, "Para1");
        assert_eq!(pages[0].summary, "summary of Para1");
        assert_eq!(pages[0].illustration.as_ref().unwrap().as_str(), "https://img.test/1.png");
        assert_eq!(pages[1].paragraph, "Para2");
        assert_eq!(pages[1].illustration.as_ref().unwrap().as_str(), "https://img.test/2.png");
        assert_eq!(*presenter.rendered.lock().unwrap(), vec![output.clone()]);
    }

    #[tokio::test]
    async fn test_failed_image_leaves_placeholder_in_place() {
        let journal = Journal::default();
        let text = MockTextGenerator::new(&journal, Ok("Title\n\nPara1\n\nPara2".to_string()));
        let presenter = RecordingPresenter::new(&journal);
        let config = PipelineConfig {
            title_handling: TitleHandling::Heading,
            ..Default::default()
        };
        let rejected = GenerationError::Service("Your request was rejected".to_string());

        let output = pipeline(config, text, &journal, Some(("Para2", rejected)))
            .run(&fantasy_selection(true), &presenter)
            .await;

        let illustrations: Vec<Option<&str>> = output
            .pages()
            .iter()
            .map(|p| p.illustration.as_ref().map(Url::as_str))
            .collect();
        assert_eq!(illustrations, vec![Some("https://img.test/1.png"), None]);
        assert_eq!(
            entries(&journal, "notice:"),
            vec!["An API error occurred: Your request was rejected"]
        );
    }

    #[tokio::test]
    async fn test_bad_credential_cascades_through_every_call() {
        let journal = Journal::default();
        let mut text = MockTextGenerator::new(&journal, Err(auth_error()));
        text.summary_error = Some(auth_error());
        let presenter = RecordingPresenter::new(&journal);

        let output = pipeline(
            PipelineConfig::default(),
            text,
            &journal,
            Some(("", auth_error())),
        )
        .run(&fantasy_selection(true), &presenter)
        .await;

        // the empty story is still one paragraph, and it is still summarized and illustrated
        assert_eq!(entries(&journal, "text:").len(), 2);
        assert_eq!(entries(&journal, "image:"), vec![" In the style of Cartoon art."]);
        assert_eq!(
            output.pages(),
            &[Page {
                paragraph: String::new(),
                summary: String::new(),
                illustration: None,
            }]
        );
        assert_eq!(entries(&journal, "notice:").len(), 3);
    }

    #[tokio::test]
    async fn test_failed_summaries_keep_sequence_shape() {
        let journal = Journal::default();
        let mut text = MockTextGenerator::new(&journal, Ok("A\n\nB\n\nC".to_string()));
        text.summary_error = Some(auth_error());
        let presenter = RecordingPresenter::new(&journal);

        let output = pipeline(
            PipelineConfig::default(),
            text,
            &journal,
            Some(("", auth_error())),
        )
        .run(&fantasy_selection(true), &presenter)
        .await;

        let pages = output.pages();
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.summary.is_empty() && p.illustration.is_none()));
        assert_eq!(
            pages.iter().map(|p| p.paragraph.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        assert_eq!(entries(&journal, "image:").len(), 3);
        assert_eq!(entries(&journal, "notice:").len(), 6);
    }

    #[tokio::test]
    async fn test_abort_on_auth_error_skips_remaining_calls() {
        let journal = Journal::default();
        let text = MockTextGenerator::new(&journal, Err(auth_error()));
        let presenter = RecordingPresenter::new(&journal);
        let config = PipelineConfig {
            abort_on_auth_error: true,
            ..Default::default()
        };

        let output = pipeline(config, text, &journal, None)
            .run(&fantasy_selection(true), &presenter)
            .await;

        assert_eq!(entries(&journal, "text:").len(), 1);
        assert!(entries(&journal, "image:").is_empty());
        assert_eq!(
            entries(&journal, "notice:"),
            vec!["An authentication error occurred. Please check your API key."]
        );
        assert_eq!(output.pages().len(), 1);
        assert_eq!(output.pages()[0].illustration, None);
    }

    #[tokio::test]
    async fn test_concurrent_fan_out_preserves_paragraph_order() {
        let journal = Journal::default();
        let story = "slow one\n\nfast two\n\nslow three\n\nfast four";
        let text = MockTextGenerator::new(&journal, Ok(story.to_string()));
        let presenter = RecordingPresenter::new(&journal);
        let config = PipelineConfig {
            concurrency: 4,
            ..Default::default()
        };

        let output = pipeline(config, text, &journal, None)
            .run(&fantasy_selection(true), &presenter)
            .await;

        let completed = entries(&journal, "done:");
        assert_eq!(completed.len(), 4);
        assert_ne!(completed, vec!["slow one", "fast two", "slow three", "fast four"]);

        let summaries: Vec<&str> = output.pages().iter().map(|p| p.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec![
                "summary of slow one",
                "summary of fast two",
                "summary of slow three",
                "summary of fast four",
            ]
        );
        assert!(output.pages().iter().all(|p| p.illustration.is_some()));
    }

    #[tokio::test]
    async fn test_spinner_stages_are_balanced() {
        let journal = Journal::default();
        let text = MockTextGenerator::new(&journal, Ok("Title\n\nPara1".to_string()));
        let presenter = RecordingPresenter::new(&journal);

        pipeline(PipelineConfig::default(), text, &journal, None)
            .run(&fantasy_selection(true), &presenter)
            .await;

        let begins = entries(&journal, "begin:");
        let mut ends = entries(&journal, "end:");
        assert_eq!(ends.last().map(String::as_str), Some("Generating images..."));
        let mut sorted_begins = begins.clone();
        sorted_begins.sort();
        ends.sort();
        assert_eq!(sorted_begins, ends);
        assert_eq!(begins[0], "Smooshing story...");
        assert_eq!(begins[1], "Generating images...");
        assert_eq!(
            begins[2],
            "Generating image for: summary of Title In the style of Cartoon art."
        );
    }
}
