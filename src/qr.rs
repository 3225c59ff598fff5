// src/qr.rs
use base64::{engine::general_purpose, Engine as _};
use image::{GrayImage, ImageBuffer, Luma};
use qrcode::{EcLevel, QrCode};
use std::path::Path;
use thiserror::Error;

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct QrService {
    module_size: u32,
    border: u32,
}

impl Default for QrService {
    fn default() -> Self {
        Self::new()
    }
}

impl QrService {
    pub fn new() -> Self {
        Self {
            module_size: 10, // Размер пикселя
            border: 4,       // Размер рамки в модулях
        }
    }

    /// Генерировать QR код в формате base64 data URL
    pub fn generate_qr_code(&self, data: &str) -> anyhow::Result<String> {
        let png_bytes = self.render_png(data)?;
        let base64_string = general_purpose::STANDARD.encode(&png_bytes);

        Ok(format!("{}{}", DATA_URI_PREFIX, base64_string))
    }

    /// Нарисовать QR код и закодировать в PNG
    pub fn render_png(&self, data: &str) -> anyhow::Result<Vec<u8>> {
        let code = QrCode::with_error_correction_level(data, EcLevel::M)?;
        let img = self.rasterize(&code);

        let mut png_bytes = Vec::new();
        {
            use image::codecs::png::PngEncoder;
            use image::ImageEncoder;

            let encoder = PngEncoder::new(&mut png_bytes);
            encoder.write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ColorType::L8,
            )?;
        }

        Ok(png_bytes)
    }

    fn rasterize(&self, code: &QrCode) -> GrayImage {
        let width = code.width() as u32;
        let img_size = (width + 2 * self.border) * self.module_size;

        // Белый фон
        let mut img: GrayImage = ImageBuffer::from_pixel(img_size, img_size, Luma([255]));

        for (i, color) in code.to_colors().into_iter().enumerate() {
            if color != qrcode::Color::Dark {
                continue;
            }
            let x = i as u32 % width;
            let y = i as u32 / width;
            let left = (self.border + x) * self.module_size;
            let top = (self.border + y) * self.module_size;
            for py in top..top + self.module_size {
                for px in left..left + self.module_size {
                    img.put_pixel(px, py, Luma([0]));
                }
            }
        }

        img
    }

    /// Прочитать изображение с диска и найти в нем QR код.
    ///
    /// `Ok(None)` значит, что изображение валидное, но QR кода в нем нет.
    pub fn decode_file(&self, path: &Path) -> Result<Option<String>, DecodeError> {
        // Формат определяем по содержимому, а не по расширению
        let bytes = std::fs::read(path)?;
        self.decode_bytes(&bytes)
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Option<String>, DecodeError> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.scan(&img.to_luma8()))
    }

    fn scan(&self, luma: &GrayImage) -> Option<String> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            luma.width() as usize,
            luma.height() as usize,
            |x, y| luma.get_pixel(x as u32, y as u32).0[0],
        );

        let grids = prepared.detect_grids();
        log::debug!("Found {} candidate QR grids", grids.len());

        grids.iter().find_map(|grid| match grid.decode() {
            Ok((_meta, content)) => Some(content),
            Err(e) => {
                log::debug!("Skipping undecodable grid: {:?}", e);
                None
            }
        })
    }
}
