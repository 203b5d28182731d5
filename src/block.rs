//! Layout blocks returned by the OCR service.
//!
//! A page is recognized as an ordered list of [`Block`]s. The order is the
//! service's reading order and everything downstream relies on it, so blocks
//! are never sorted or re-grouped after parsing.
//!
//! Blocks round-trip through the progress file, which other tools may also
//! read. Unknown fields are kept in [`Block::extra`] and bbox values are kept
//! as JSON numbers, so `12` is written back as `12` and `12.5` as `12.5`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Ordered blocks of one recognized page.
pub type PageResult = Vec<Block>;

/// The layout category of a block.
///
/// Categories the assembler does not treat specially are handled as text, so
/// an unseen category string is preserved in [`Category::Other`] rather than
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Caption,
    Footnote,
    Formula,
    ListItem,
    PageFooter,
    PageHeader,
    Picture,
    SectionHeader,
    Table,
    Text,
    Title,
    Other(String),
}

impl Category {
    /// The wire name used by the OCR service.
    pub fn as_str(&self) -> &str {
        match self {
            Category::Caption => "Caption",
            Category::Footnote => "Footnote",
            Category::Formula => "Formula",
            Category::ListItem => "List-item",
            Category::PageFooter => "Page-footer",
            Category::PageHeader => "Page-header",
            Category::Picture => "Picture",
            Category::SectionHeader => "Section-header",
            Category::Table => "Table",
            Category::Text => "Text",
            Category::Title => "Title",
            Category::Other(s) => s,
        }
    }

    /// Running headers and footers, which never reach the markdown.
    pub fn is_page_furniture(&self) -> bool {
        matches!(self, Category::PageHeader | Category::PageFooter)
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Caption" => Category::Caption,
            "Footnote" => Category::Footnote,
            "Formula" => Category::Formula,
            "List-item" => Category::ListItem,
            "Page-footer" => Category::PageFooter,
            "Page-header" => Category::PageHeader,
            "Picture" => Category::Picture,
            "Section-header" => Category::SectionHeader,
            "Table" => Category::Table,
            "Text" => Category::Text,
            "Title" => Category::Title,
            _ => Category::Other(s),
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        match c {
            Category::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One content unit of a recognized page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// `[x1, y1, x2, y2]` in the pixel space of the image sent to OCR.
    /// Kept as raw JSON numbers; see [`Block::rect`] for the numeric view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<Number>>,

    pub category: Category,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Fields this crate does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    pub fn new(category: Category, text: impl Into<String>) -> Self {
        Self {
            bbox: None,
            category,
            text: Some(text.into()),
            extra: Map::new(),
        }
    }

    pub fn with_bbox<N: Into<Number>>(mut self, bbox: [N; 4]) -> Self {
        self.bbox = Some(bbox.into_iter().map(Into::into).collect());
        self
    }

    /// The block text, or `""` when the service sent none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// The bbox as a rectangle, if it has exactly four numeric entries.
    pub fn rect(&self) -> Option<BBox> {
        match self.bbox.as_deref() {
            Some([x1, y1, x2, y2]) => Some(BBox {
                x1: x1.as_f64()?,
                y1: y1.as_f64()?,
                x2: x2.as_f64()?,
                y2: y2.as_f64()?,
            }),
            _ => None,
        }
    }
}

/// A pixel rectangle `(x1, y1)`–`(x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    /// Integer pixel rectangle `(x, y, width, height)` clipped to a
    /// `width` × `height` raster, or `None` if nothing is left.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: f64, max: u32| v.round().clamp(0.0, max as f64) as u32;
        let left = clamp(self.x1.min(self.x2), width);
        let right = clamp(self.x1.max(self.x2), width);
        let top = clamp(self.y1.min(self.y2), height);
        let bottom = clamp(self.y1.max(self.y2), height);
        if right <= left || bottom <= top {
            return None;
        }
        Some((left, top, right - left, bottom - top))
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_wire_names() {
        assert_eq!(Category::from("Page-header".to_string()), Category::PageHeader);
        assert_eq!(Category::from("List-item".to_string()), Category::ListItem);
        assert_eq!(
            Category::from("Sidebar".to_string()),
            Category::Other("Sidebar".into())
        );
        assert_eq!(String::from(Category::PageFooter), "Page-footer");
        assert_eq!(String::from(Category::Other("Sidebar".into())), "Sidebar");
    }

    #[test]
    fn block_round_trips_unknown_fields_and_integers() {
        let raw = r#"{"bbox":[10,20,110.5,220],"category":"Picture","score":0.9}"#;
        let block: Block = serde_json::from_str(raw).unwrap();
        assert_eq!(block.category, Category::Picture);
        assert_eq!(block.text, None);
        assert_eq!(block.extra.get("score"), Some(&serde_json::json!(0.9)));

        let back = serde_json::to_value(&block).unwrap();
        assert_eq!(back, serde_json::from_str::<Value>(raw).unwrap());
        assert_eq!(back["bbox"][0].to_string(), "10");
        assert_eq!(back["bbox"][2].to_string(), "110.5");
    }

    #[test]
    fn rect_requires_four_numbers() {
        let b = Block::new(Category::Picture, "").with_bbox([1, 2, 3, 4]);
        assert_eq!(
            b.rect(),
            Some(BBox {
                x1: 1.0,
                y1: 2.0,
                x2: 3.0,
                y2: 4.0
            })
        );

        let mut short = b.clone();
        short.bbox = Some(vec![Number::from(1), Number::from(2)]);
        assert_eq!(short.rect(), None);

        let mut missing = b;
        missing.bbox = None;
        assert_eq!(missing.rect(), None);
    }

    #[test]
    fn missing_text_reads_as_empty() {
        let block: Block = serde_json::from_str(r#"{"category":"Text"}"#).unwrap();
        assert_eq!(block.text(), "");
    }

    #[test]
    fn clip_to_raster() {
        let b = BBox {
            x1: -5.0,
            y1: 10.0,
            x2: 50.4,
            y2: 500.0,
        };
        assert_eq!(b.clip_to(40, 100), Some((0, 10, 40, 90)));

        let empty = BBox {
            x1: 5.0,
            y1: 5.0,
            x2: 5.0,
            y2: 9.0,
        };
        assert_eq!(empty.clip_to(40, 100), None);
    }
}
