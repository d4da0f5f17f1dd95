//! Prompt templates for the three kinds of generation call.
//!
//! All builders are plain string templates: they never fail and pass empty
//! input through unchanged.

use crate::core::selection::Selection;

pub const STORY_SYSTEM_PROMPT: &str =
    "You are an AI language model that creates children's stories.";
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are an AI language model that summarizes text.";

pub fn build_story_prompt(selection: &Selection) -> String {
    let age = selection.age();
    format!(
        "You write the most wonderful children's stories. \
        You always start with a title and write a complete short story with a resolving ending. \
        Create a {} story for a {}-year-old child featuring a {} in a {} setting. \
        The story should focus on the theme of {} and include a {} as a key element. \
        Make the story engaging and age-appropriate, \
        using vocabulary and complexity suitable for a {}-year-old.",
        selection.genre(),
        age,
        selection.main_character(),
        selection.setting(),
        selection.theme(),
        selection.plot_device(),
        age
    )
}

pub fn build_summary_prompt(paragraph: &str) -> String {
    format!(
        "Summarize the following paragraph in a brief image description:\n\n{}",
        paragraph
    )
}

pub fn build_image_prompt(summary: &str, style: &str) -> String {
    format!("{} In the style of {} art.", summary, style)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Category;
    use crate::core::selection::tests::fantasy_selection;

    #[test]
    fn test_story_prompt_slots() {
        let prompt = build_story_prompt(&fantasy_selection(false));
        assert_eq!(
            prompt,
            "You write the most wonderful children's stories. You always start with a title and \
            write a complete short story with a resolving ending. Create a Fantasy story for a \
            6-year-old child featuring a Animals in a Forest setting. The story should focus on \
            the theme of Friendship and include a Quests as a key element. Make the story engaging \
            and age-appropriate, using vocabulary and complexity suitable for a 6-year-old."
        );
        assert_eq!(prompt.matches("6-year-old").count(), 2);
    }

    #[test]
    fn test_every_catalog_value_lands_once() {
        let base = [
            (Category::Genre, "Fantasy"),
            (Category::MainCharacter, "Animals"),
            (Category::Setting, "Forest"),
            (Category::Theme, "Friendship"),
            (Category::PlotDevice, "Quests"),
        ];

        for category in Category::ALL {
            for value in category.options() {
                let mut builder = Selection::builder().generate_images(false);
                for (c, v) in base {
                    let v = if c == category { *value } else { v };
                    builder = builder.choose(c, v).unwrap();
                }
                let prompt = build_story_prompt(&builder.build().unwrap());
                assert_eq!(
                    prompt.matches(value).count(),
                    1,
                    "{} `{}` in: {}",
                    category,
                    value,
                    prompt
                );
            }
        }
    }

    #[test]
    fn test_every_age_lands_twice() {
        for age in 3..=12u8 {
            let selection = Selection::builder()
                .choose(Category::Genre, "Horror")
                .unwrap()
                .choose(Category::MainCharacter, "Aliens")
                .unwrap()
                .choose(Category::Setting, "Desert")
                .unwrap()
                .choose(Category::Theme, "Respect")
                .unwrap()
                .choose(Category::PlotDevice, "Riddles")
                .unwrap()
                .age(age)
                .unwrap()
                .generate_images(false)
                .build()
                .unwrap();
            let prompt = build_story_prompt(&selection);
            assert_eq!(
                prompt.matches(&format!(" {}-year-old", age)).count(),
                2
            );
        }
    }

    #[test]
    fn test_summary_prompt() {
        assert_eq!(
            build_summary_prompt("The fox found a map."),
            "Summarize the following paragraph in a brief image description:\n\nThe fox found a map."
        );
        assert!(build_summary_prompt("").ends_with(":\n\n"));
    }

    #[test]
    fn test_image_prompt() {
        assert_eq!(
            build_image_prompt("A fox holding a map", "Watercolor"),
            "A fox holding a map In the style of Watercolor art."
        );
        assert_eq!(build_image_prompt("", "Comic"), " In the style of Comic art.");
    }
}
