// SPDX-License-Identifier: MPL-2.0

//! Segmentation label space and its fixed color table
//!
//! Labels follow the selfie multiclass segmentation model: one small integer
//! per pixel. Each label maps to a display color used when blending.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Per-pixel labels for one frame, row-major, parallel to the RGBA buffer
pub type CategoryMask = Vec<u8>;

/// An RGB triple from the category color table
pub type CategoryColor = [u8; 3];

/// Segmentation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    Background = 0,
    Hair = 1,
    BodySkin = 2,
    FaceSkin = 3,
    Clothes = 4,
    Others = 5,
}

impl Category {
    /// All categories in label order
    pub const ALL: [Category; 6] = [
        Category::Background,
        Category::Hair,
        Category::BodySkin,
        Category::FaceSkin,
        Category::Clothes,
        Category::Others,
    ];

    /// Mask label of this category
    pub fn label(self) -> u8 {
        self as u8
    }

    /// Category for a mask label (None for labels the model never emits)
    pub fn from_label(label: u8) -> Option<Self> {
        Self::ALL.get(label as usize).copied()
    }

    /// Color from the category color table
    pub fn color(self) -> CategoryColor {
        CATEGORY_COLORS[self as usize]
    }

    /// Display name for logs and the CLI
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Background => "background",
            Category::Hair => "hair",
            Category::BodySkin => "body_skin",
            Category::FaceSkin => "face_skin",
            Category::Clothes => "clothes",
            Category::Others => "others",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        if let Ok(label) = normalized.parse::<u8>() {
            return Self::from_label(label).ok_or_else(|| format!("unknown label {}", label));
        }
        Self::ALL
            .into_iter()
            .find(|c| c.display_name() == normalized)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Category color table, indexed by label
pub const CATEGORY_COLORS: [CategoryColor; 6] = [
    [206, 162, 98], // Background: grayish yellow
    [193, 0, 32],   // Hair: vivid red
    [255, 104, 0],  // BodySkin: vivid orange
    [255, 197, 0],  // FaceSkin: vivid yellow
    [0, 161, 194],  // Clothes: vivid blue
    [0, 125, 52],   // Others: vivid green
];
