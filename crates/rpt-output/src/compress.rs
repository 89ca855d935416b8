//! Optional compression of finished artifacts
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use rpt_core::{Compression, ReportError, ReportResult};
use std::io::Write;

/// Writes `bytes` to `out`, gzipped when asked
pub fn write_compressed(bytes: &[u8], compression: Compression, out: &mut dyn Write) -> ReportResult<()> {
    match compression {
        Compression::None => out.write_all(bytes)?,
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(out, GzLevel::default());
            encoder.write_all(bytes)?;
            encoder
                .finish()
                .map_err(|e| ReportError::Output(format!("Cannot compress output - {}", e)))?;
        }
    }
    Ok(())
}
