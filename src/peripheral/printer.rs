use crate::config::{PrinterConfig, PrinterDriverKind};
use crate::error::PeripheralError;
use image::imageops::{self, BiLevel, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use qrcode::{EcLevel, QrCode};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::request::{unsupported, PeripheralEvent, PeripheralHandler, PeripheralRequest};

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
/// Rows per raster command; keeps each block within the printer buffer
const RASTER_BAND_ROWS: u32 = 255;
const MAX_IMAGE_HEIGHT: u32 = 4096;
/// Dots per QR module
const QR_MODULE_DOTS: u32 = 6;

pub fn create_printer(config: &PrinterConfig) -> Box<dyn PeripheralHandler> {
    info!("Selecting printer driver: {:?}", config.driver);
    match config.driver {
        PrinterDriverKind::Thermal => Box::new(ThermalPrinter::new(config)),
        PrinterDriverKind::Null => Box::new(NullPrinter::new(config)),
    }
}

/// Text printed around the images of a session slip
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionSlip {
    header: Vec<String>,
    footer: Vec<String>,
}

fn slip_header(config: &PrinterConfig) -> Vec<String> {
    [&config.name, &config.url]
        .into_iter()
        .filter(|line| !line.is_empty())
        .cloned()
        .collect()
}

impl SessionSlip {
    fn new(config: &PrinterConfig, session_id: u32, tags: &[String]) -> Self {
        let header = slip_header(config);

        let mut footer = Vec::new();
        if !tags.is_empty() {
            footer.push(
                tags.iter()
                    .map(|t| format!("#{}", t))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        if config.print_date {
            footer.push(chrono::Local::now().format("%Y-%m-%d %H:%M").to_string());
        }
        footer.push(format!("Session #{}", session_id));
        if !config.end_text.is_empty() {
            footer.push(config.end_text.clone());
        }

        Self { header, footer }
    }
}

/// Last `count` images of a session, in capture order
fn last_images(images: &[PathBuf], count: usize) -> &[PathBuf] {
    &images[images.len().saturating_sub(count)..]
}

/// ESC/POS command stream
#[derive(Debug, Default)]
struct EscPos {
    buf: Vec<u8>,
}

impl EscPos {
    fn new() -> Self {
        let mut cmd = Self::default();
        cmd.buf.extend_from_slice(&[ESC, b'@']);
        cmd
    }

    fn text(&mut self, line: &str) -> &mut Self {
        // Printer charset is ASCII
        self.buf
            .extend(line.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
        self.buf.push(b'\n');
        self
    }

    fn center(&mut self, on: bool) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'a', u8::from(on)]);
        self
    }

    fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'd', lines]);
        self
    }

    /// `GS v 0` raster bit image; dark pixels print
    fn raster(&mut self, image: &GrayImage) -> &mut Self {
        let width_bytes = (image.width() + 7) / 8;
        let mut top = 0;

        while top < image.height() {
            let rows = RASTER_BAND_ROWS.min(image.height() - top);
            self.buf.extend_from_slice(&[
                GS,
                b'v',
                b'0',
                0,
                (width_bytes & 0xFF) as u8,
                (width_bytes >> 8) as u8,
                (rows & 0xFF) as u8,
                (rows >> 8) as u8,
            ]);

            for y in top..top + rows {
                for byte_x in 0..width_bytes {
                    let mut byte = 0u8;
                    for bit in 0..8 {
                        let x = byte_x * 8 + bit;
                        if x < image.width() && image.get_pixel(x, y)[0] < 128 {
                            byte |= 0x80 >> bit;
                        }
                    }
                    self.buf.push(byte);
                }
            }
            top += rows;
        }
        self
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Rotate landscape images onto the paper, scale to the print head width and
/// dither down to black and white.
fn prepare_bitmap(image: &DynamicImage, max_width: u32) -> GrayImage {
    let image = if image.width() > image.height() {
        image.rotate90()
    } else {
        image.clone()
    };

    let image = if image.width() > max_width {
        let height = (image.height() as u64 * max_width as u64 / image.width() as u64) as u32;
        image.resize_exact(max_width, height.clamp(1, MAX_IMAGE_HEIGHT), FilterType::Triangle)
    } else {
        image
    };

    let mut gray = image.to_luma8();
    imageops::dither(&mut gray, &BiLevel);
    gray
}

/// `data` as a QR code strip `max_width` dots wide, code centred
fn qr_bitmap(data: &str, max_width: u32) -> Result<GrayImage, PeripheralError> {
    let code = QrCode::with_error_correction_level(data, EcLevel::M).map_err(|e| {
        PeripheralError::QrCode {
            details: e.to_string(),
        }
    })?;
    let modules = code.width() as u32;
    let colors = code.to_colors();

    let scale = (max_width / modules).clamp(1, QR_MODULE_DOTS);
    let mut qr = GrayImage::from_fn(modules * scale, modules * scale, |x, y| {
        let index = (y / scale * modules + x / scale) as usize;
        Luma([colors[index].select(0, 255)])
    });
    if qr.width() > max_width {
        qr = imageops::resize(&qr, max_width, max_width, FilterType::Nearest);
    }

    let mut strip = GrayImage::from_pixel(max_width.max(qr.width()), qr.height(), Luma([255]));
    let left = (strip.width() - qr.width()) / 2;
    imageops::replace(&mut strip, &qr, left as i64, 0);
    Ok(strip)
}

/// ESC/POS thermal printer on a serial device
pub struct ThermalPrinter {
    config: PrinterConfig,
}

impl ThermalPrinter {
    pub fn new(config: &PrinterConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn write(&self, commands: EscPos) -> Result<(), PeripheralError> {
        let device_error = |e: std::io::Error| PeripheralError::PrinterDevice {
            device: self.config.device.clone(),
            details: e.to_string(),
        };

        let bytes = commands.into_bytes();
        let mut device = OpenOptions::new()
            .write(true)
            .open(&self.config.device)
            .map_err(device_error)?;
        device.write_all(&bytes).map_err(device_error)?;
        device.flush().map_err(device_error)?;

        debug!("ThermalPrinter: wrote {} bytes", bytes.len());
        Ok(())
    }

    fn print_image(&self, image: &RgbImage) -> Result<(), PeripheralError> {
        let bitmap = prepare_bitmap(&DynamicImage::ImageRgb8(image.clone()), self.config.max_width);
        info!(
            "ThermalPrinter: printing {}x{} image",
            bitmap.width(),
            bitmap.height()
        );

        let mut cmd = EscPos::new();
        cmd.raster(&bitmap).feed(3);
        self.write(cmd)
    }

    fn print_session(
        &self,
        session_id: u32,
        images: &[PathBuf],
        tags: &[String],
    ) -> Result<(), PeripheralError> {
        info!("ThermalPrinter: printing session {}", session_id);
        let slip = SessionSlip::new(&self.config, session_id, tags);

        let mut cmd = EscPos::new();
        cmd.center(true);
        for line in &slip.header {
            cmd.text(line);
        }
        cmd.feed(1);

        for path in last_images(images, self.config.print_last_img_cnt) {
            let image = image::open(path).map_err(|e| PeripheralError::PrinterDevice {
                device: self.config.device.clone(),
                details: format!("{}: {}", path.display(), e),
            })?;
            cmd.raster(&prepare_bitmap(&image, self.config.max_width)).feed(1);
        }

        for line in &slip.footer {
            cmd.text(line);
        }
        cmd.center(false).feed(3);
        self.write(cmd)
    }

    fn print_video(&self, url: &str) -> Result<(), PeripheralError> {
        info!("ThermalPrinter: printing video link {}", url);
        let qr = qr_bitmap(url, self.config.max_width)?;

        let mut cmd = EscPos::new();
        cmd.center(true);
        for line in slip_header(&self.config) {
            cmd.text(&line);
        }
        cmd.feed(1).raster(&qr).feed(1).text(url);
        if self.config.print_date {
            cmd.text(&chrono::Local::now().format("%Y-%m-%d %H:%M").to_string());
        }
        if !self.config.end_text.is_empty() {
            cmd.text(&self.config.end_text);
        }
        cmd.center(false).feed(3);
        self.write(cmd)
    }
}

impl PeripheralHandler for ThermalPrinter {
    fn name(&self) -> &'static str {
        "thermal"
    }

    fn handle(
        &mut self,
        request: PeripheralRequest,
    ) -> Result<Option<PeripheralEvent>, PeripheralError> {
        match &request {
            PeripheralRequest::PrintImage { image } => self.print_image(image)?,
            PeripheralRequest::PrintSession {
                session_id,
                images,
                tags,
            } => self.print_session(*session_id, images, tags)?,
            PeripheralRequest::PrintVideo { url } => self.print_video(url)?,
            _ => return Err(unsupported(self.name(), &request)),
        }
        Ok(None)
    }
}

/// Printer stand-in that saves what would be printed as `print-<n>.jpg`
pub struct NullPrinter {
    config: PrinterConfig,
    output_dir: PathBuf,
    print_cnt: u32,
}

impl NullPrinter {
    pub fn new(config: &PrinterConfig) -> Self {
        Self {
            config: config.clone(),
            output_dir: PathBuf::from(&config.null_output_dir),
            print_cnt: 0,
        }
    }

    pub fn print_count(&self) -> u32 {
        self.print_cnt
    }

    fn save(&mut self, image: &RgbImage) -> Result<PathBuf, PeripheralError> {
        let io_error = |details: String| PeripheralError::PrinterDevice {
            device: "null".to_string(),
            details,
        };

        fs::create_dir_all(&self.output_dir).map_err(|e| io_error(e.to_string()))?;
        let path = self.output_dir.join(format!("print-{}.jpg", self.print_cnt));
        image.save(&path).map_err(|e| io_error(e.to_string()))?;
        self.print_cnt += 1;

        info!("NullPrinter: image saved to: {}", path.display());
        Ok(path)
    }

    fn print_session(
        &mut self,
        session_id: u32,
        images: &[PathBuf],
        tags: &[String],
    ) -> Result<(), PeripheralError> {
        let slip = SessionSlip::new(&self.config, session_id, tags);
        for line in slip.header.iter().chain(slip.footer.iter()) {
            info!("NullPrinter: | {}", line);
        }

        for path in last_images(images, self.config.print_last_img_cnt) {
            let image = open_rgb(path)?;
            self.save(&image)?;
        }
        Ok(())
    }
}

fn open_rgb(path: &Path) -> Result<RgbImage, PeripheralError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| PeripheralError::PrinterDevice {
            device: "null".to_string(),
            details: format!("{}: {}", path.display(), e),
        })
}

impl PeripheralHandler for NullPrinter {
    fn name(&self) -> &'static str {
        "null"
    }

    fn handle(
        &mut self,
        request: PeripheralRequest,
    ) -> Result<Option<PeripheralEvent>, PeripheralError> {
        match &request {
            PeripheralRequest::PrintImage { image } => {
                self.save(image)?;
            }
            PeripheralRequest::PrintSession {
                session_id,
                images,
                tags,
            } => self.print_session(*session_id, images, tags)?,
            PeripheralRequest::PrintVideo { url } => {
                info!("NullPrinter: video link {}", url);
            }
            _ => return Err(unsupported(self.name(), &request)),
        }
        Ok(None)
    }
}
