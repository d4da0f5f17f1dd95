use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::error::GenerationError;
use crate::core::story::StoryOutput;

/// A long-running step the user should see progress for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Story,
    Images,
    Image { prompt: String },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Story => f.write_str("Smooshing story..."),
            Stage::Images => f.write_str("Generating images..."),
            Stage::Image { prompt } => write!(f, "Generating image for: {}", prompt),
        }
    }
}

/// Everything the pipeline shows to the user goes through here.
pub trait Presenter: Send + Sync {
    fn welcome(&self) {}
    fn begin(&self, stage: &Stage);
    fn end(&self, stage: &Stage);
    fn diagnostics(&self, prompt: &str, model: &str);
    fn notice(&self, error: &GenerationError);
    fn render(&self, output: &StoryOutput);
}

#[derive(Default)]
struct Spinner {
    bar: Option<ProgressBar>,
    /// Image requests currently running under the "Generating images..." spinner.
    images_in_flight: usize,
}

#[derive(Default)]
pub struct TerminalPresenter {
    spinner: Mutex<Spinner>,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints above the spinner when one is running.
    fn print_line(&self, line: &str) {
        match self.spinner.lock() {
            Ok(guard) => match guard.bar.as_ref() {
                Some(pb) => pb.println(line),
                None => println!("{}", line),
            },
            Err(_) => println!("{}", line),
        }
    }
}

impl Presenter for TerminalPresenter {
    fn welcome(&self) {
        println!("📖 Welcome to StorySmoosh");
        println!("Create a unique and fun story by choosing your favorite story elements.");
        println!("Let's get started!\n");
    }

    fn begin(&self, stage: &Stage) {
        let Ok(mut guard) = self.spinner.lock() else {
            return;
        };
        let spinner = &mut *guard;
        match (stage, spinner.bar.as_ref()) {
            (Stage::Image { .. }, Some(pb)) => {
                spinner.images_in_flight += 1;
                pb.set_message(stage.to_string());
            }
            _ => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::with_template("{spinner:.green} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.set_message(stage.to_string());
                pb.enable_steady_tick(Duration::from_millis(100));
                if let Some(previous) = spinner.bar.replace(pb) {
                    previous.finish_and_clear();
                }
                spinner.images_in_flight = 0;
            }
        }
    }

    fn end(&self, stage: &Stage) {
        let Ok(mut guard) = self.spinner.lock() else {
            return;
        };
        let spinner = &mut *guard;
        match stage {
            Stage::Image { .. } => {
                spinner.images_in_flight = spinner.images_in_flight.saturating_sub(1);
                if spinner.images_in_flight == 0 {
                    if let Some(pb) = spinner.bar.as_ref() {
                        pb.set_message(Stage::Images.to_string());
                    }
                }
            }
            _ => {
                spinner.images_in_flight = 0;
                if let Some(pb) = spinner.bar.take() {
                    pb.finish_and_clear();
                }
            }
        }
    }

    fn diagnostics(&self, prompt: &str, model: &str) {
        self.print_line(&format!("Prompt: {}", prompt));
        self.print_line(&format!("Model: {}", model));
    }

    fn notice(&self, error: &GenerationError) {
        self.print_line(&format!("❌ {}", error.notice()));
    }

    fn render(&self, output: &StoryOutput) {
        match output {
            StoryOutput::Plain(story) => {
                println!("\n== Your story: ==\n");
                println!("{}", story);
            }
            StoryOutput::Illustrated { title, pages } => {
                println!("\n== Your story with images: ==\n");
                if let Some(title) = title {
                    println!("# {}\n", title);
                }
                for page in pages {
                    println!("## {}", page.paragraph);
                    match &page.illustration {
                        Some(url) => println!("🖼  {}\n", url),
                        None => println!("[image unavailable]\n"),
                    }
                }
            }
        }
    }
}
