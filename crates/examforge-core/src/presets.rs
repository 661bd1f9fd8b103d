//! Named difficulty presets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::blueprint::Blueprint;
use crate::model::{Difficulty, DifficultyCounts};

/// A whole-series difficulty mix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DifficultyPreset {
    /// Keep each section's own distribution.
    #[default]
    Blueprint,
    Balanced,
    EasyHeavy,
    HardHeavy,
    MediumFocus,
}

impl DifficultyPreset {
    pub const ALL: [DifficultyPreset; 5] = [
        DifficultyPreset::Blueprint,
        DifficultyPreset::Balanced,
        DifficultyPreset::EasyHeavy,
        DifficultyPreset::HardHeavy,
        DifficultyPreset::MediumFocus,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DifficultyPreset::Blueprint => "blueprint",
            DifficultyPreset::Balanced => "balanced",
            DifficultyPreset::EasyHeavy => "easy-heavy",
            DifficultyPreset::HardHeavy => "hard-heavy",
            DifficultyPreset::MediumFocus => "medium-focus",
        }
    }

    /// Easy/Medium/Hard percentages, or `None` for [`DifficultyPreset::Blueprint`].
    pub fn percentages(&self) -> Option<[u32; 3]> {
        match self {
            DifficultyPreset::Blueprint => None,
            DifficultyPreset::Balanced => Some([20, 50, 30]),
            DifficultyPreset::EasyHeavy => Some([40, 40, 20]),
            DifficultyPreset::HardHeavy => Some([15, 35, 50]),
            DifficultyPreset::MediumFocus => Some([25, 60, 15]),
        }
    }

    /// Split `total` questions by this preset. Each share is rounded and
    /// Medium takes the remainder. `None` for the blueprint preset.
    pub fn distribute(&self, total: u32) -> Option<DifficultyCounts> {
        let [e, _, h] = self.percentages()?;
        let share = |pct: u32| (total * pct + 50) / 100;
        let mut easy = share(e);
        let mut hard = share(h);
        while easy + hard > total {
            if hard >= easy {
                hard -= 1;
            } else {
                easy -= 1;
            }
        }
        Some(
            [
                (Difficulty::Easy, easy),
                (Difficulty::Medium, total - easy - hard),
                (Difficulty::Hard, hard),
            ]
            .into_iter()
            .collect(),
        )
    }

    /// Rewrite every section and subsection distribution of `blueprint`.
    /// Returns whether anything changed.
    pub fn apply(&self, blueprint: &mut Blueprint) -> bool {
        if self.percentages().is_none() {
            return false;
        }
        for section in &mut blueprint.sections {
            if section.subsections.is_empty() {
                if let Some(dist) = self.distribute(section.total_questions) {
                    section.difficulty_distribution = dist;
                }
            }
            for sub in &mut section.subsections {
                if let Some(dist) = self.distribute(sub.total_questions) {
                    sub.difficulty_distribution = dist;
                }
            }
        }
        true
    }
}

impl fmt::Display for DifficultyPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DifficultyPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', ' '], "-");
        DifficultyPreset::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = DifficultyPreset::ALL.iter().map(|p| p.name()).collect();
                format!("unknown difficulty preset '{s}' (expected one of: {})", names.join(", "))
            })
    }
}
