use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::catalog::{Category, OptionCatalog, IMAGE_STYLES};
use crate::core::error::SelectionError;

/// Age of the child the story is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Age(u8);

impl Age {
    pub const MIN: u8 = 3;
    pub const MAX: u8 = 12;

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Age {
    fn default() -> Self {
        Age(Self::MIN)
    }
}

impl TryFrom<u8> for Age {
    type Error = SelectionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Age(value))
        } else {
            Err(SelectionError::AgeOutOfRange(value))
        }
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The complete set of story parameters for one run.
///
/// Only [`SelectionBuilder::build`] creates one, so every category always
/// carries a catalog value and an image style is present whenever images
/// are requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    choices: BTreeMap<Category, String>,
    age: Age,
    show_diagnostics: bool,
    image_style: Option<String>,
}

impl Selection {
    pub fn builder() -> SelectionBuilder {
        SelectionBuilder::default()
    }

    pub fn choice(&self, category: Category) -> &str {
        // build() guarantees every category is present
        self.choices.get(&category).map(String::as_str).unwrap_or_default()
    }

    pub fn genre(&self) -> &str {
        self.choice(Category::Genre)
    }

    pub fn main_character(&self) -> &str {
        self.choice(Category::MainCharacter)
    }

    pub fn setting(&self) -> &str {
        self.choice(Category::Setting)
    }

    pub fn theme(&self) -> &str {
        self.choice(Category::Theme)
    }

    pub fn plot_device(&self) -> &str {
        self.choice(Category::PlotDevice)
    }

    pub fn age(&self) -> Age {
        self.age
    }

    pub fn show_diagnostics(&self) -> bool {
        self.show_diagnostics
    }

    pub fn generate_images(&self) -> bool {
        self.image_style.is_some()
    }

    pub fn image_style(&self) -> Option<&str> {
        self.image_style.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct SelectionBuilder {
    catalog: OptionCatalog,
    choices: BTreeMap<Category, String>,
    age: Age,
    show_diagnostics: bool,
    generate_images: bool,
    image_style: Option<String>,
}

impl Default for SelectionBuilder {
    fn default() -> Self {
        Self {
            catalog: OptionCatalog::new(),
            choices: BTreeMap::new(),
            age: Age::default(),
            show_diagnostics: false,
            generate_images: true,
            image_style: None,
        }
    }
}

impl SelectionBuilder {
    pub fn choose(mut self, category: Category, value: &str) -> Result<Self, SelectionError> {
        if !self.catalog.contains(category, value) {
            return Err(SelectionError::InvalidOption {
                category,
                value: value.to_string(),
            });
        }
        self.choices.insert(category, value.to_string());
        Ok(self)
    }

    /// Same as [`choose`](Self::choose) but with the category given by name.
    #[cfg(test)]
    pub(crate) fn choose_named(self, category: &str, value: &str) -> Result<Self, SelectionError> {
        let category: Category = category.parse()?;
        self.choose(category, value)
    }

    pub fn age(mut self, age: u8) -> Result<Self, SelectionError> {
        self.age = Age::try_from(age)?;
        Ok(self)
    }

    pub fn show_diagnostics(mut self, show: bool) -> Self {
        self.show_diagnostics = show;
        self
    }

    pub fn generate_images(mut self, generate: bool) -> Self {
        self.generate_images = generate;
        self
    }

    pub fn image_style(mut self, style: &str) -> Result<Self, SelectionError> {
        if !IMAGE_STYLES.contains(&style) {
            return Err(SelectionError::InvalidImageStyle(style.to_string()));
        }
        self.image_style = Some(style.to_string());
        Ok(self)
    }

    pub fn build(self) -> Result<Selection, SelectionError> {
        if let Some(missing) = Category::ALL
            .into_iter()
            .find(|c| !self.choices.contains_key(c))
        {
            return Err(SelectionError::MissingChoice(missing));
        }

        let image_style = if self.generate_images {
            Some(self.image_style.ok_or(SelectionError::MissingImageStyle)?)
        } else {
            None
        };

        Ok(Selection {
            choices: self.choices,
            age: self.age,
            show_diagnostics: self.show_diagnostics,
            image_style,
        })
    }
}

/// Selection as written in the `story` section of `config.yml`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SelectionConfig {
    pub genre: Option<String>,
    pub main_character: Option<String>,
    pub setting: Option<String>,
    pub theme: Option<String>,
    pub plot_device: Option<String>,
    pub age: Option<u8>,
    #[serde(default)]
    pub show_diagnostics: bool,
    #[serde(default = "default_generate_images")]
    pub generate_images: bool,
    pub image_style: Option<String>,
}

fn default_generate_images() -> bool {
    true
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            genre: None,
            main_character: None,
            setting: None,
            theme: None,
            plot_device: None,
            age: None,
            show_diagnostics: false,
            generate_images: default_generate_images(),
            image_style: None,
        }
    }
}

impl SelectionConfig {
    pub fn to_selection(&self) -> Result<Selection, SelectionError> {
        let mut builder = Selection::builder()
            .show_diagnostics(self.show_diagnostics)
            .generate_images(self.generate_images);

        let values = [
            (Category::Genre, &self.genre),
            (Category::MainCharacter, &self.main_character),
            (Category::Setting, &self.setting),
            (Category::Theme, &self.theme),
            (Category::PlotDevice, &self.plot_device),
        ];
        for (category, value) in values {
            if let Some(value) = value {
                builder = builder.choose(category, value)?;
            }
        }

        builder = builder.age(self.age.ok_or(SelectionError::MissingAge)?)?;
        if self.generate_images {
            if let Some(style) = &self.image_style {
                builder = builder.image_style(style)?;
            }
        }

        builder.build()
    }
}
