//! Module-matrix encoding
//!
//! The QR symbol itself (mode selection, Reed-Solomon, masking) is produced by
//! the `qrcode` crate. The rest of the crate only sees the [`Encoder`] trait so
//! tests can swap in fixed matrices.

use qrcode::QrCode;

use crate::error::EncodeError;
use crate::qr::EcLevel;

/// Square boolean grid of modules, `true` = dark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMatrix {
    width: usize,
    modules: Vec<bool>,
}

impl ModuleMatrix {
    /// Returns `None` unless `modules.len() == width * width`.
    pub fn new(width: usize, modules: Vec<bool>) -> Option<Self> {
        (width > 0 && modules.len() == width * width).then_some(Self { width, modules })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, col: usize, row: usize) -> bool {
        self.modules[row * self.width + col]
    }

    pub fn count_dark(&self) -> usize {
        self.modules.iter().filter(|&&m| m).count()
    }
}

/// Capability to turn content into a module matrix
pub trait Encoder: Send + Sync {
    fn encode(&self, content: &str, level: EcLevel) -> Result<ModuleMatrix, EncodeError>;
}

/// Production encoder backed by the `qrcode` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct QrCodeEncoder;

impl From<EcLevel> for qrcode::EcLevel {
    fn from(level: EcLevel) -> Self {
        match level {
            EcLevel::L => qrcode::EcLevel::L,
            EcLevel::M => qrcode::EcLevel::M,
            EcLevel::Q => qrcode::EcLevel::Q,
            EcLevel::H => qrcode::EcLevel::H,
        }
    }
}

impl Encoder for QrCodeEncoder {
    fn encode(&self, content: &str, level: EcLevel) -> Result<ModuleMatrix, EncodeError> {
        let code = QrCode::with_error_correction_level(content.as_bytes(), level.into())
            .map_err(|e| EncodeError(e.to_string()))?;

        let width = code.width();
        let modules = code
            .to_colors()
            .into_iter()
            .map(|c| c == qrcode::Color::Dark)
            .collect();

        ModuleMatrix::new(width, modules)
            .ok_or_else(|| EncodeError(format!("encoder returned a ragged {width}-wide matrix")))
    }
}
