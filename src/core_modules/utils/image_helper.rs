pub mod image_helper {
    use crate::error::Result;
    use image::error::{ImageError, ParameterError, ParameterErrorKind};
    use image::{ExtendedColorType, ImageEncoder, codecs::png::PngEncoder};
    use std::io::Write;
    use std::path::Path;

    /// Encodes a raw buffer as PNG into any writer.
    pub fn write_png<W: Write>(
        writer: W,
        width: u32,
        height: u32,
        buffer: &[u8],
        color: ExtendedColorType,
    ) -> Result<()> {
        let expected = (width as u64 * height as u64 * color.bits_per_pixel() as u64).div_ceil(8);
        if expected != buffer.len() as u64 {
            return Err(ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            ))
            .into());
        }
        let encoder = PngEncoder::new(writer);
        encoder.write_image(buffer, width, height, color)?;
        Ok(())
    }

    pub fn encode_png(width: u32, height: u32, buffer: &[u8], color: ExtendedColorType) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        write_png(&mut bytes, width, height, buffer, color)?;
        Ok(bytes)
    }

    pub fn save_png<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        buffer: &[u8],
        color: ExtendedColorType,
    ) -> Result<()> {
        let output = std::fs::File::create(path)?;
        write_png(std::io::BufWriter::new(output), width, height, buffer, color)
    }

    /// Scales 8-bit values into `[0, 1]`, the layout most digit classifiers take.
    pub fn to_unit_tensor(values: &[u8]) -> Vec<f32> {
        values.iter().map(|&v| v as f32 / 255.0).collect()
    }
}
