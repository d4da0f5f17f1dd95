use anyhow::{Context, Result};
use inquire::validator::Validation;
use inquire::{Confirm, CustomType, Password, PasswordDisplayMode, Select};

use crate::core::catalog::{Category, OptionCatalog};
use crate::core::config::Config;
use crate::core::selection::{Age, Selection};
use crate::services::llm::ApiKey;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Resolves the credential: config file, then environment, then a masked prompt.
pub fn resolve_api_key(config: &Config) -> Result<ApiKey> {
    if let Some(key) = config.llm.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Ok(ApiKey::new(key.trim()));
    }
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(ApiKey::new(key.trim()));
        }
    }
    if config.unattended {
        // the service rejects the empty key on first use
        log::warn!("No API key configured and {} is not set", API_KEY_ENV);
        return Ok(ApiKey::new(""));
    }

    let key = Password::new("Enter your OpenAI API Key:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()
        .context("Failed to read API key")?;
    Ok(ApiKey::new(key.trim()))
}

/// Builds the run's [`Selection`], from `config.story` when unattended or
/// by prompting otherwise.
pub fn collect_selection(config: &Config, catalog: &OptionCatalog) -> Result<Selection> {
    if config.unattended {
        let story = config
            .story
            .as_ref()
            .context("`unattended: true` requires a `story` section in the config")?;
        return story.to_selection().context("Invalid `story` section in the config");
    }
    prompt_selection(catalog)
}

fn prompt_selection(catalog: &OptionCatalog) -> Result<Selection> {
    let mut builder = Selection::builder();

    for &category in catalog.categories() {
        let value = select_option(category)?;
        builder = builder.choose(category, value)?;
    }

    let age = CustomType::<u8>::new("Child's Age")
        .with_default(Age::MIN)
        .with_help_message("3 to 12")
        .with_validator(|age: &u8| {
            if (Age::MIN..=Age::MAX).contains(age) {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("Age must be between 3 and 12".into()))
            }
        })
        .prompt()
        .context("Failed to read age")?;
    builder = builder.age(age)?;

    let show_diagnostics = Confirm::new("Show API prompts and models")
        .with_default(false)
        .prompt()?;
    let generate_images = Confirm::new("Generate images").with_default(true).prompt()?;
    builder = builder
        .show_diagnostics(show_diagnostics)
        .generate_images(generate_images);

    if generate_images {
        let style = Select::new(
            "Choose the desired style for the images:",
            catalog.image_styles().to_vec(),
        )
        .prompt()?;
        builder = builder.image_style(style)?;
    }

    Ok(builder.build()?)
}

fn select_option(category: Category) -> Result<&'static str> {
    let label = format!("Choose a {}", category);
    Select::new(&label, category.options().to_vec())
        .prompt()
        .with_context(|| format!("Failed to read {}", category))
}
