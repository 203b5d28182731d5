//! Document assembly: recognized pages → markdown + figure crop list.
//!
//! Pages are walked in ascending page number, blocks in the order the service
//! returned them. Per block:
//!
//! | Category | Output |
//! |---|---|
//! | `Page-header`, `Page-footer` | nothing |
//! | `Picture` with a 4-number bbox | `![caption](./<file>)` + a [`CropRequest`] |
//! | `Caption` right after such a Picture | consumed as that picture's alt text |
//! | `Footnote` | `[^n]: text`, `n` counting across the whole document |
//! | anything else | the trimmed text as a paragraph |
//!
//! Blocks with empty (trimmed) text produce nothing. Pages missing from the
//! map leave no trace in the output.

use crate::block::{BBox, Block, Category, PageResult};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A figure region to cut out of a page raster.
#[derive(Debug, Clone, PartialEq)]
pub struct CropRequest {
    /// 1-based page number.
    pub page_num: usize,
    /// Rectangle in the page's OCR pixel space.
    pub bbox: BBox,
    /// Output file name, relative to the output directory.
    pub filename: String,
}

/// Result of [`assemble`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledDocument {
    pub markdown: String,
    /// Crops in the order their references appear in `markdown`.
    pub crops: Vec<CropRequest>,
}

impl AssembledDocument {
    pub fn is_empty(&self) -> bool {
        self.markdown.is_empty() && self.crops.is_empty()
    }
}

/// Build the markdown for a document named `stem` from its recognized pages.
///
/// The output depends only on `stem` and `pages`.
pub fn assemble(stem: &str, pages: &BTreeMap<usize, PageResult>) -> AssembledDocument {
    let mut doc = AssembledDocument::default();
    let mut footnote = 1usize;

    for (&page_num, blocks) in pages.range(1..) {
        let mut iter = blocks.iter().peekable();

        while let Some(block) = iter.next() {
            match &block.category {
                c if c.is_page_furniture() => {}

                Category::Picture => {
                    let Some(bbox) = block.rect() else {
                        continue;
                    };
                    let filename = crop_filename(stem, page_num, block);

                    let caption = match iter.peek() {
                        Some(next) if next.category == Category::Caption => {
                            let text = next.text().to_string();
                            iter.next();
                            text
                        }
                        _ => String::new(),
                    };

                    let _ = write!(doc.markdown, "![{caption}](./{filename})\n\n");
                    doc.crops.push(CropRequest {
                        page_num,
                        bbox,
                        filename,
                    });
                }

                Category::Footnote => {
                    let text = block.text().trim();
                    if !text.is_empty() {
                        let _ = write!(doc.markdown, "[^{footnote}]: {text}\n\n");
                        footnote += 1;
                    }
                }

                _ => {
                    let text = block.text().trim();
                    if !text.is_empty() {
                        doc.markdown.push_str(text);
                        doc.markdown.push_str("\n\n");
                    }
                }
            }
        }
    }

    doc
}

/// `<stem>_page_<N>_<x1>_<x2>_<y1>_<y2>.png`, with bbox numbers written as
/// stored (so `12` and `12.0` give different names).
fn crop_filename(stem: &str, page_num: usize, block: &Block) -> String {
    match block.bbox.as_deref() {
        Some([x1, y1, x2, y2]) => format!("{stem}_page_{page_num}_{x1}_{x2}_{y1}_{y2}.png"),
        _ => format!("{stem}_page_{page_num}.png"),
    }
}
