use std::fmt;
use std::str::FromStr;

use crate::core::error::CatalogError;

pub const GENRES: &[&str] = &[
    "Adventure",
    "Fantasy",
    "Mystery",
    "Science Fiction",
    "Historical Fiction",
    "Fairy Tales",
    "Superheroes",
    "Comedy",
    "Drama",
    "Horror",
];

pub const MAIN_CHARACTERS: &[&str] = &[
    "Animals",
    "Humans",
    "Mythical Creatures",
    "Robots or AI",
    "Aliens",
    "Superheroes",
    "Pirates",
    "Time Travelers",
    "Explorers",
    "Magical Beings",
];

pub const SETTINGS: &[&str] = &[
    "Forest",
    "City",
    "Outer Space",
    "Underwater",
    "Desert",
    "Jungle",
    "Mountains",
    "Arctic or Antarctic",
    "Time Travel",
    "Alternate Universes or Dimensions",
];

pub const THEMES: &[&str] = &[
    "Friendship",
    "Bravery",
    "Kindness",
    "Creativity",
    "Curiosity",
    "Perseverance",
    "Teamwork",
    "Responsibility",
    "Respect",
    "Environmentalism",
];

pub const PLOT_DEVICES: &[&str] = &[
    "Quests",
    "Riddles",
    "Time Travel",
    "Magical Objects",
    "Secret Passageways",
    "Hidden Treasure",
    "Unexpected Allies",
    "Escapes and Chases",
    "Parallel Worlds",
    "Transformations",
];

pub const IMAGE_STYLES: &[&str] = &[
    "Cartoon",
    "Realistic",
    "Watercolor",
    "Sketch",
    "Comic",
    "Pixel Art",
    "Minimalist",
];

/// One of the fixed story-element categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Genre,
    MainCharacter,
    Setting,
    Theme,
    PlotDevice,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Genre,
        Category::MainCharacter,
        Category::Setting,
        Category::Theme,
        Category::PlotDevice,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Genre => "genre",
            Category::MainCharacter => "main character",
            Category::Setting => "setting",
            Category::Theme => "theme",
            Category::PlotDevice => "plot device",
        }
    }

    pub fn options(self) -> &'static [&'static str] {
        match self {
            Category::Genre => GENRES,
            Category::MainCharacter => MAIN_CHARACTERS,
            Category::Setting => SETTINGS,
            Category::Theme => THEMES,
            Category::PlotDevice => PLOT_DEVICES,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = CatalogError;

    /// Accepts "main character", "main_character" and "main-character" alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        Category::ALL
            .into_iter()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| CatalogError::UnknownCategory(s.to_string()))
    }
}

/// Read-only view over the category → allowed values table.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionCatalog;

impl OptionCatalog {
    pub fn new() -> Self {
        Self
    }

    pub fn categories(&self) -> &'static [Category] {
        &Category::ALL
    }

    pub fn options_for(&self, category: &str) -> Result<&'static [&'static str], CatalogError> {
        Ok(category.parse::<Category>()?.options())
    }

    pub fn contains(&self, category: Category, value: &str) -> bool {
        category.options().contains(&value)
    }

    pub fn image_styles(&self) -> &'static [&'static str] {
        IMAGE_STYLES
    }
}
