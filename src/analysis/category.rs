//! Image categories and the prompts used for each

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of categories an image is classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Portrait,
    Landscape,
    Architecture,
    Interior,
    Food,
    Animal,
    Product,
    Artwork,
    Graphic,
    #[default]
    Other,
}

impl ImageCategory {
    pub const ALL: [ImageCategory; 10] = [
        ImageCategory::Portrait,
        ImageCategory::Landscape,
        ImageCategory::Architecture,
        ImageCategory::Interior,
        ImageCategory::Food,
        ImageCategory::Animal,
        ImageCategory::Product,
        ImageCategory::Artwork,
        ImageCategory::Graphic,
        ImageCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageCategory::Portrait => "portrait",
            ImageCategory::Landscape => "landscape",
            ImageCategory::Architecture => "architecture",
            ImageCategory::Interior => "interior",
            ImageCategory::Food => "food",
            ImageCategory::Animal => "animal",
            ImageCategory::Product => "product",
            ImageCategory::Artwork => "artwork",
            ImageCategory::Graphic => "graphic",
            ImageCategory::Other => "other",
        }
    }

    /// Read a category out of a free-form model answer.
    ///
    /// The first word naming a category wins; anything unrecognised is
    /// `Other`.
    pub fn from_answer(answer: &str) -> Self {
        answer
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|word| !word.is_empty())
            .find_map(|word| word.parse().ok())
            .unwrap_or(ImageCategory::Other)
    }

    /// What the description should pay attention to for this category
    fn focus(&self) -> &'static str {
        match self {
            ImageCategory::Portrait => {
                "the people: apparent age range, expression, pose, clothing, hair, framing and lighting on the face"
            }
            ImageCategory::Landscape => {
                "the scenery: terrain, sky and weather, time of day, season, colour palette and depth of the view"
            }
            ImageCategory::Architecture => {
                "the building: architectural style, materials, facade, perspective, surroundings and era"
            }
            ImageCategory::Interior => {
                "the space: room type, furniture, materials, colour scheme, lighting and decoration style"
            }
            ImageCategory::Food => {
                "the dish: ingredients, cuisine, plating, garnish, tableware, texture and freshness"
            }
            ImageCategory::Animal => {
                "the animal: species or breed, colouring, posture, behaviour and habitat"
            }
            ImageCategory::Product => {
                "the object: product type, shape, material, colour, branding-free features and staging"
            }
            ImageCategory::Artwork => {
                "the artwork: medium, technique, style or movement, subject matter, composition and palette"
            }
            ImageCategory::Graphic => {
                "the design: layout, typography, icons, colour palette, and any readable text"
            }
            ImageCategory::Other => "the main subject, setting, colours, composition and mood",
        }
    }
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        ImageCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid image category: {}", s))
    }
}

/// Prompt asking for a one-word category
pub fn classification_prompt() -> String {
    let names: Vec<&str> = ImageCategory::ALL.iter().map(|c| c.as_str()).collect();
    format!(
        "Classify this image into exactly one of these categories: {}. \
         Answer with the category name only, in lowercase, with no other words.",
        names.join(", ")
    )
}

/// Category-specific prompt asking for the structured description
pub fn description_prompt(category: ImageCategory, max_tags: usize) -> String {
    format!(
        "This image has been classified as '{category}'. Describe it, focusing on {focus}.\n\
         Respond with a single JSON object and nothing else, using exactly these keys:\n\
         - \"summary\": one sentence describing the image\n\
         - \"visual_detail\": a detailed paragraph of the visual features, suitable for similarity search\n\
         - \"tags\": an array of at most {max_tags} short lowercase keywords",
        category = category,
        focus = category.focus(),
        max_tags = max_tags,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_answer_exact() {
        for category in ImageCategory::ALL {
            assert_eq!(ImageCategory::from_answer(category.as_str()), category);
        }
    }

    #[test]
    fn test_from_answer_tolerates_noise() {
        assert_eq!(ImageCategory::from_answer("  Food.\n"), ImageCategory::Food);
        assert_eq!(
            ImageCategory::from_answer("Category: **Architecture**"),
            ImageCategory::Architecture
        );
        assert_eq!(ImageCategory::from_answer("\"animal\""), ImageCategory::Animal);
    }

    #[test]
    fn test_from_answer_unknown_is_other() {
        assert_eq!(ImageCategory::from_answer("vehicle"), ImageCategory::Other);
        assert_eq!(ImageCategory::from_answer(""), ImageCategory::Other);
    }

    #[test]
    fn test_prompts_mention_categories_and_limit() {
        let prompt = classification_prompt();
        for category in ImageCategory::ALL {
            assert!(prompt.contains(category.as_str()));
        }

        let prompt = description_prompt(ImageCategory::Food, 15);
        assert!(prompt.contains("'food'"));
        assert!(prompt.contains("at most 15"));
        assert!(prompt.contains("visual_detail"));
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&ImageCategory::Artwork).unwrap(), "\"artwork\"");
        assert_eq!("Graphic".parse::<ImageCategory>().unwrap(), ImageCategory::Graphic);
    }
}
