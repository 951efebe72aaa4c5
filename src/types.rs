use std::fmt::Display;

use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

// Defines a new type that wraps a String for use as an ID.
macro_rules! idtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

idtype!(OptionLabel);

/// Label recorded for a question where no bubble was judged filled.
pub const NO_ANSWER: &str = "none";

/// A candidate bubble: the bounding box of an external contour in the mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Mark {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn rect(&self) -> Rect {
        Rect::at(self.x as i32, self.y as i32).of_size(self.width.max(1), self.height.max(1))
    }
}

impl Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_extents() {
        let mark = Mark::new(10, 20, 15, 16);
        assert_eq!(mark.right(), 25);
        assert_eq!(mark.bottom(), 36);
        assert!((mark.aspect_ratio() - 0.9375).abs() < f32::EPSILON);
        assert_eq!(mark.rect(), Rect::at(10, 20).of_size(15, 16));
    }

    #[test]
    fn option_label_serializes_as_plain_string() {
        let label = OptionLabel::from("b");
        assert_eq!(serde_json::to_string(&label).unwrap(), "\"b\"");
        assert_eq!(label.to_string(), "b");
    }
}
