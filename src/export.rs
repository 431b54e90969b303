//! Export of rendered images to downloadable formats
//!
//! All formats are produced from the same raster. SVG and PDF only wrap that
//! raster; neither re-traces the modules as vectors.

use std::fmt;
use std::io::{Cursor, Write};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::error::ExportError;
use crate::pipeline::RenderedImage;

pub const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    #[serde(alias = "jpeg")]
    Jpg,
    Webp,
    Svg,
    Pdf,
    Zip,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpg => "jpg",
            ExportFormat::Webp => "webp",
            ExportFormat::Svg => "svg",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Zip => "zip",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpg => "image/jpeg",
            ExportFormat::Webp => "image/webp",
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Zip => "application/zip",
        }
    }

    /// Download name, e.g. `qrcode-1717171717171.png`
    pub fn file_name(self, timestamp_millis: i64) -> String {
        format!("qrcode-{}.{}", timestamp_millis, self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpg" | "jpeg" => Ok(ExportFormat::Jpg),
            "webp" => Ok(ExportFormat::Webp),
            "svg" => Ok(ExportFormat::Svg),
            "pdf" => Ok(ExportFormat::Pdf),
            "zip" => Ok(ExportFormat::Zip),
            other => Err(format!("unsupported export format `{other}`")),
        }
    }
}

pub fn export(image: &RenderedImage, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Png => to_png(image),
        ExportFormat::Jpg => to_jpeg(image),
        ExportFormat::Webp => to_webp(image),
        ExportFormat::Svg => to_svg(image).map(String::into_bytes),
        ExportFormat::Pdf => to_pdf(image),
        ExportFormat::Zip => to_zip(image),
    }
}

pub fn to_png(image: &RenderedImage) -> Result<Vec<u8>, ExportError> {
    write_format(image.to_dynamic(), ImageFormat::Png)
}

/// Lossless only: the `image` codec has no lossy WebP encoder.
pub fn to_webp(image: &RenderedImage) -> Result<Vec<u8>, ExportError> {
    write_format(image.to_dynamic(), ImageFormat::WebP)
}

pub fn to_jpeg(image: &RenderedImage) -> Result<Vec<u8>, ExportError> {
    let rgb = flatten(image);
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(bytes)
}

/// Wraps the PNG raster in an `<svg><image>` element.
pub fn to_svg(image: &RenderedImage) -> Result<String, ExportError> {
    let png = to_png(image)?;
    let (w, h) = image.pixels.dimensions();
    Ok(format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" "#,
            r#"xmlns:xlink="http://www.w3.org/1999/xlink" "#,
            r#"width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r#"<image href="data:image/png;base64,{data}" width="{w}" height="{h}"/>"#,
            "</svg>"
        ),
        w = w,
        h = h,
        data = STANDARD.encode(png),
    ))
}

/// Single-page PDF whose page is exactly the raster, drawn as a JPEG XObject.
pub fn to_pdf(image: &RenderedImage) -> Result<Vec<u8>, ExportError> {
    let jpeg = to_jpeg(image)?;
    let (w, h) = image.pixels.dimensions();
    let content = format!("q\n{w} 0 0 {h} 0 0 cm\n/Im0 Do\nQ\n");

    let mut pdf = PdfWriter::default();
    pdf.object(b"<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {w} {h}] \
             /Resources << /XObject << /Im0 5 0 R >> >> /Contents 4 0 R >>"
        )
        .as_bytes(),
    );
    pdf.stream("", content.as_bytes());
    pdf.stream(
        &format!(
            "/Type /XObject /Subtype /Image /Width {w} /Height {h} \
             /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode"
        ),
        &jpeg,
    );
    Ok(pdf.finish(1))
}

/// PNG + JPEG + SVG plus the spec as JSON, so the code can be re-rendered.
pub fn to_zip(image: &RenderedImage) -> Result<Vec<u8>, ExportError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let entries: [(&str, Vec<u8>); 4] = [
        ("qrcode.png", to_png(image)?),
        ("qrcode.jpg", to_jpeg(image)?),
        ("qrcode.svg", to_svg(image)?.into_bytes()),
        ("qrcode.json", serde_json::to_vec_pretty(&image.spec)?),
    ];
    for (name, bytes) in entries {
        zip.start_file(name, options)?;
        zip.write_all(&bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}

fn write_format(image: DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

/// Drops alpha by compositing onto white.
fn flatten(image: &RenderedImage) -> RgbImage {
    RgbImage::from_fn(image.pixels.width(), image.pixels.height(), |x, y| {
        let px = image.pixels.get_pixel(x, y);
        let a = px[3] as u32;
        let over_white = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([over_white(px[0]), over_white(px[1]), over_white(px[2])])
    })
}

/// Minimal PDF-1.4 serializer tracking object offsets for the xref table
#[derive(Default)]
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    const HEADER: &'static [u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

    fn start_object(&mut self) {
        if self.buf.is_empty() {
            self.buf.extend_from_slice(Self::HEADER);
        }
        self.offsets.push(self.buf.len());
        self.buf
            .extend_from_slice(format!("{} 0 obj\n", self.offsets.len()).as_bytes());
    }

    fn object(&mut self, body: &[u8]) {
        self.start_object();
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, dict: &str, data: &[u8]) {
        self.start_object();
        self.buf
            .extend_from_slice(format!("<< {dict} /Length {} >>\nstream\n", data.len()).as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self, root: usize) -> Vec<u8> {
        let xref_at = self.buf.len();
        let count = self.offsets.len() + 1;
        let mut xref = format!("xref\n0 {count}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            xref.push_str(&format!("{offset:010} 00000 n \n"));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {count} /Root {root} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n"
        ));
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::QrSpec;
    use crate::render::Layout;
    use image::{Rgba, RgbaImage};
    use std::io::Read;
    use zip::ZipArchive;

    fn sample() -> RenderedImage {
        let pixels = RgbaImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgba([30, 41, 59, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        RenderedImage {
            pixels,
            spec: QrSpec::default(),
            layout: Layout::new(64, 21),
        }
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("PNG".parse(), Ok(ExportFormat::Png));
        assert_eq!("jpeg".parse(), Ok(ExportFormat::Jpg));
        assert_eq!("Zip".parse(), Ok(ExportFormat::Zip));
        assert!("gif".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn download_names() {
        assert_eq!(ExportFormat::Jpg.file_name(1717171717171), "qrcode-1717171717171.jpg");
        assert_eq!(ExportFormat::Svg.mime_type(), "image/svg+xml");
    }

    #[test]
    fn png_round_trips_losslessly() {
        let image = sample();
        let bytes = export(&image, ExportFormat::Png).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        assert_eq!(image::load_from_memory(&bytes).unwrap().to_rgba8(), image.pixels);
    }

    #[test]
    fn webp_is_lossless() {
        let image = sample();
        let bytes = export(&image, ExportFormat::Webp).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
        assert_eq!(image::load_from_memory(&bytes).unwrap().to_rgba8(), image.pixels);
    }

    #[test]
    fn jpeg_flattens_alpha() {
        let mut image = sample();
        image.pixels.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let bytes = export(&image, ExportFormat::Jpg).unwrap();
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(flatten(&image).get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn svg_embeds_the_raster() {
        let svg = to_svg(&sample()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"viewBox="0 0 64 64""#));
        assert!(svg.contains(r#"<image href="data:image/png;base64,"#));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn pdf_xref_points_at_objects() {
        let pdf = to_pdf(&sample()).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));

        let text = String::from_utf8_lossy(&pdf);
        assert!(text.contains("/Filter /DCTDecode"));
        assert!(text.contains("/MediaBox [0 0 64 64]"));

        let marker = b"startxref\n";
        let at = pdf.windows(marker.len()).rposition(|w| w == marker).unwrap();
        let tail = std::str::from_utf8(&pdf[at + marker.len()..]).unwrap();
        let xref_at: usize = tail.lines().next().unwrap().parse().unwrap();

        let table = std::str::from_utf8(&pdf[xref_at..]).unwrap();
        assert!(table.starts_with("xref\n0 6\n"));

        // Every in-use entry must land on "<n> 0 obj"
        for (n, line) in table.lines().skip(3).take(5).enumerate() {
            let offset: usize = line[..10].parse().unwrap();
            assert!(pdf[offset..].starts_with(format!("{} 0 obj", n + 1).as_bytes()));
        }
    }

    #[test]
    fn zip_bundles_every_format_and_the_spec() {
        let image = sample();
        let bytes = export(&image, ExportFormat::Zip).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_owned).collect();
        names.sort();
        assert_eq!(names, ["qrcode.jpg", "qrcode.json", "qrcode.png", "qrcode.svg"]);

        let mut json = String::new();
        archive.by_name("qrcode.json").unwrap().read_to_string(&mut json).unwrap();
        let spec: QrSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, image.spec);
    }
}
