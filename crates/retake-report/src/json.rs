//! JSON digest output.
//!
//! [`JsonGenerator`] serializes a [`ReviewDigest`] either compactly, for
//! piping into other tools, or pretty-printed for people.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use retake_engine::{EngineState, ReportConfig};
//! use retake_report::{json::JsonGenerator, ReviewDigest};
//!
//! let digest = ReviewDigest::from_state(&EngineState::new(), Utc::now(), &ReportConfig::default());
//! let generator = JsonGenerator::new(&digest);
//!
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ReportError, Result, ReviewDigest};

/// Serializes a [`ReviewDigest`] to JSON.
pub struct JsonGenerator<'a> {
    digest: &'a ReviewDigest,
}

impl<'a> JsonGenerator<'a> {
    /// Wraps a digest.
    #[must_use]
    pub const fn new(digest: &'a ReviewDigest) -> Self {
        Self { digest }
    }

    /// Single-line JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.digest).map_err(ReportError::from)
    }

    /// Indented JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.digest).map_err(ReportError::from)
    }

    /// Writes the digest to `path`, replacing any existing file.
    ///
    /// The parent directory must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails and
    /// [`ReportError::Io`] if the file cannot be written.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
