//! Low-level PDF writing on top of `lopdf`.
//!
//! A [`PageCanvas`] records drawing operations for one page in PDF user
//! space (origin bottom-left, units of 1/72 in). [`assemble`] turns a list of
//! canvases into a complete document: shared font resources, one content
//! stream per page, image XObjects, the page tree and the info dictionary.
//!
//! Text uses the standard Helvetica faces with `WinAnsiEncoding`, so no font
//! program is embedded. Characters outside that code page print as `?`.

use crate::error::InvoiceError;
use crate::pipeline::normalize::{RasterImage, RasterPixels};
use chrono::{DateTime, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::io::Write;

pub const PAGE_WIDTH: f32 = 600.0;
pub const PAGE_HEIGHT: f32 = 700.0;

/// Text faces available to every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// RGB fill colour with components in `0.0..=1.0`.
pub type Rgb = [f32; 3];

/// Drawing operations and images for one page.
#[derive(Debug, Default)]
pub struct PageCanvas {
    operations: Vec<Operation>,
    images: Vec<(String, RasterImage)>,
}

impl PageCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `text` in black with its baseline starting at `(x, y)`.
    pub fn text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        self.push_text(font, size, x, y, text);
    }

    /// Draw `text` in `color`.
    pub fn text_colored(&mut self, font: Font, size: f32, x: f32, y: f32, color: Rgb, text: &str) {
        self.operations.push(Operation::new("q", vec![]));
        self.push_fill_color(color);
        self.push_text(font, size, x, y, text);
        self.operations.push(Operation::new("Q", vec![]));
    }

    /// Fill the rectangle with lower-left corner `(x, y)`.
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        self.operations.push(Operation::new("q", vec![]));
        self.push_fill_color(color);
        self.operations.push(Operation::new(
            "re",
            vec![x.into(), y.into(), width.into(), height.into()],
        ));
        self.operations.push(Operation::new("f", vec![]));
        self.operations.push(Operation::new("Q", vec![]));
    }

    /// Place `raster` in the box with lower-left corner `(x, y)`.
    ///
    /// The XObject is named `<prefix><n>`, `n` counting from 1 per page, so
    /// callers can tell product thumbnails from the QR block in the output.
    pub fn image(
        &mut self,
        prefix: &str,
        raster: RasterImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) {
        let n = self
            .images
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .count()
            + 1;
        let name = format!("{prefix}{n}");
        self.operations.push(Operation::new("q", vec![]));
        self.operations.push(Operation::new(
            "cm",
            vec![
                width.into(),
                0.into(),
                0.into(),
                height.into(),
                x.into(),
                y.into(),
            ],
        ));
        self.operations
            .push(Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]));
        self.operations.push(Operation::new("Q", vec![]));
        self.images.push((name, raster));
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn push_text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        self.operations.push(Operation::new("BT", vec![]));
        self.operations.push(Operation::new(
            "Tf",
            vec![font.resource_name().into(), size.into()],
        ));
        self.operations
            .push(Operation::new("Td", vec![x.into(), y.into()]));
        self.operations.push(Operation::new(
            "Tj",
            vec![Object::String(to_win_ansi(text), StringFormat::Literal)],
        ));
        self.operations.push(Operation::new("ET", vec![]));
    }

    fn push_fill_color(&mut self, [r, g, b]: Rgb) {
        self.operations
            .push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
    }
}

/// Metadata written to the document information dictionary.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Serialise `pages` into a complete PDF document.
pub fn assemble(pages: Vec<PageCanvas>, info: &DocumentInfo) -> Result<Vec<u8>, InvoiceError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(font_dictionary("Helvetica"));
    let bold_id = doc.add_object(font_dictionary("Helvetica-Bold"));

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let mut xobjects = Dictionary::new();
        for (name, raster) in &page.images {
            let image_id = add_image(&mut doc, raster)?;
            xobjects.set(name.as_bytes().to_vec(), image_id);
        }

        let content = Content {
            operations: page.operations,
        }
        .encode()
        .map_err(|e| InvoiceError::DocumentAssembly(format!("content stream: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));

        let resources = dictionary! {
            "Font" => dictionary! {
                Font::Regular.resource_name() => regular_id,
                Font::Bold.resource_name() => bold_id,
            },
            "XObject" => xobjects,
        };
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(to_win_ansi(&info.title), StringFormat::Literal),
        "Producer" => Object::string_literal(concat!("invoice-pdf-service ", env!("CARGO_PKG_VERSION"))),
        "CreationDate" => Object::string_literal(info.created_at.format("D:%Y%m%d%H%M%SZ").to_string()),
    });
    doc.trailer.set("Info", info_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| InvoiceError::DocumentAssembly(format!("serialise: {e}")))?;
    Ok(buf)
}

fn font_dictionary(base_font: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn add_image(doc: &mut Document, raster: &RasterImage) -> Result<ObjectId, InvoiceError> {
    let width = raster.width as i64;
    let height = raster.height as i64;
    let image_dict = |color_space: &str, filter: &str| {
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => filter,
        }
    };

    let id = match &raster.pixels {
        RasterPixels::Gray(samples) => doc.add_object(Stream::new(
            image_dict("DeviceGray", "FlateDecode"),
            deflate(samples)?,
        )),
        RasterPixels::Rgb { rgb, alpha } => {
            let mut dict = image_dict("DeviceRGB", "FlateDecode");
            if let Some(alpha) = alpha {
                let smask_id = doc.add_object(Stream::new(
                    image_dict("DeviceGray", "FlateDecode"),
                    deflate(alpha)?,
                ));
                dict.set("SMask", smask_id);
            }
            doc.add_object(Stream::new(dict, deflate(rgb)?))
        }
        RasterPixels::Jpeg { data, components } => {
            let color_space = if *components == 1 {
                "DeviceGray"
            } else {
                "DeviceRGB"
            };
            doc.add_object(Stream::new(
                image_dict(color_space, "DCTDecode"),
                data.clone(),
            ))
        }
    };
    Ok(id)
}

fn deflate(bytes: &[u8]) -> Result<Vec<u8>, InvoiceError> {
    let compression_failed =
        |e: std::io::Error| InvoiceError::DocumentAssembly(format!("image compression: {e}"));
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(compression_failed)?;
    encoder.finish().map_err(compression_failed)
}

/// Encode `text` for a `WinAnsiEncoding` font.
///
/// Latin-1 maps through unchanged; the common typographic extras of
/// cp1252 (euro sign, curly quotes, dashes, ellipsis) get their code points.
pub(crate) fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::{page_images, page_texts};
    use super::*;
    use chrono::TimeZone;
    use lopdf::Document;

    fn info() -> DocumentInfo {
        DocumentInfo {
            title: "Invoice".into(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 8, 12, 0, 0).unwrap(),
        }
    }

    fn gray_square(side: u32) -> RasterImage {
        RasterImage {
            width: side,
            height: side,
            pixels: RasterPixels::Gray(vec![0x80; (side * side) as usize]),
        }
    }

    #[test]
    fn win_ansi_mapping() {
        assert_eq!(to_win_ansi("Total: $45.00"), b"Total: $45.00".to_vec());
        assert_eq!(to_win_ansi("Año"), vec![b'A', 0xF1, b'o']);
        assert_eq!(to_win_ansi("€5"), vec![0x80, b'5']);
        assert_eq!(to_win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn assembles_one_page_per_canvas() {
        let mut first = PageCanvas::new();
        first.text(Font::Bold, 14.0, 40.0, 650.0, "Page one");
        let mut second = PageCanvas::new();
        second.text(Font::Regular, 10.0, 40.0, 650.0, "Page two");

        let bytes = assemble(vec![first, second], &info()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let texts = page_texts(&bytes);
        assert_eq!(texts, vec![vec!["Page one".to_string()], vec!["Page two".to_string()]]);
    }

    #[test]
    fn images_become_xobjects() {
        let mut page = PageCanvas::new();
        page.image("Im", gray_square(8), 10.0, 10.0, 20.0, 20.0);
        page.image("Im", gray_square(4), 40.0, 10.0, 20.0, 20.0);
        page.image("Qr", gray_square(16), 100.0, 10.0, 60.0, 60.0);

        let bytes = assemble(vec![page], &info()).unwrap();
        assert_eq!(
            page_images(&bytes),
            vec![vec!["Im1".to_string(), "Im2".to_string(), "Qr1".to_string()]]
        );

        let doc = Document::load_mem(&bytes).unwrap();
        let images: Vec<_> = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| {
                s.dict
                    .get(b"Subtype")
                    .and_then(|v| v.as_name())
                    .map(|n| n == b"Image")
                    .unwrap_or(false)
            })
            .collect();
        assert_eq!(images.len(), 3);
    }

    #[test]
    fn alpha_adds_soft_mask() {
        let mut page = PageCanvas::new();
        page.image(
            "Im",
            RasterImage {
                width: 2,
                height: 1,
                pixels: RasterPixels::Rgb {
                    rgb: vec![255, 0, 0, 0, 255, 0],
                    alpha: Some(vec![255, 0]),
                },
            },
            0.0,
            0.0,
            2.0,
            1.0,
        );
        let bytes = assemble(vec![page], &info()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let with_smask = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| s.dict.has(b"SMask"))
            .count();
        assert_eq!(with_smask, 1);
    }

    #[test]
    fn info_dictionary_is_written() {
        let bytes = assemble(vec![PageCanvas::new()], &info()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let info_ref = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_dictionary(info_ref).unwrap();
        let created = info.get(b"CreationDate").unwrap().as_str().unwrap();
        assert_eq!(created, b"D:20260308120000Z");
    }
}
