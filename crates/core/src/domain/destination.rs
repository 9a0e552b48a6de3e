// Destination names for stored uploads
//
// A producer-supplied filename is untrusted. Only its final path segment is kept,
// and the result must name a plain file directly inside the storage root.

use crate::domain::error::{DomainError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Longest filename accepted, in bytes (common filesystem limit)
pub const MAX_FILENAME_BYTES: usize = 255;

/// Device names that cannot be used as files on Windows, with or without extension
const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// A sanitized, single-segment filename inside the storage root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DestinationName(String);

impl DestinationName {
    /// Sanitize an untrusted filename.
    ///
    /// Directory components are stripped (both `/` and `\` separators), then the
    /// remaining segment is validated:
    /// - not empty, not `.` or `..`, not hidden (leading `.`)
    /// - no control characters, no `:`
    /// - at most [`MAX_FILENAME_BYTES`] bytes
    /// - not a reserved device name
    ///
    /// # Example
    /// ```
    /// use clipdock_core::domain::DestinationName;
    ///
    /// let name = DestinationName::sanitize("../../etc/x.mp4").unwrap();
    /// assert_eq!(name.as_str(), "x.mp4");
    /// ```
    pub fn sanitize(raw: &str) -> Result<Self> {
        let last_segment = raw.rsplit(['/', '\\']).next().unwrap_or_default();
        let name = last_segment.trim();

        if name.is_empty() {
            return Err(DomainError::EmptyFilename);
        }
        if name == "." || name == ".." || name.starts_with('.') {
            return Err(DomainError::ReservedFilename(name.to_string()));
        }
        if let Some(c) = name.chars().find(|c| c.is_control() || *c == ':') {
            return Err(DomainError::ForbiddenCharacter(c));
        }
        if name.len() > MAX_FILENAME_BYTES {
            return Err(DomainError::FilenameTooLong {
                max: MAX_FILENAME_BYTES,
            });
        }

        let stem = name.split('.').next().unwrap_or(name).trim_end();
        if RESERVED_DEVICE_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(stem))
        {
            return Err(DomainError::ReservedFilename(name.to_string()));
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join onto `root`, verifying the result is a direct child of `root`
    pub fn resolve_under(&self, root: &Path) -> Result<PathBuf> {
        let mut components = Path::new(&self.0).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        let path = root.join(&self.0);
        if !single_normal || path.parent() != Some(root) {
            return Err(DomainError::OutsideRoot(self.0.clone()));
        }
        Ok(path)
    }

    /// Deterministic collision variant: `clip.mp4` -> `clip-2.mp4`.
    ///
    /// The stem is shortened when needed so the result stays within
    /// [`MAX_FILENAME_BYTES`].
    pub fn with_suffix(&self, n: u32) -> Self {
        let suffix = format!("-{n}");
        let (stem, ext) = match self.0.rfind('.') {
            Some(dot) if dot > 0 => self.0.split_at(dot),
            _ => (self.0.as_str(), ""),
        };

        let budget = MAX_FILENAME_BYTES.saturating_sub(suffix.len() + ext.len());
        let kept = truncate_at_char_boundary(stem, budget);
        if kept.is_empty() {
            // Extension leaves no room: fold it into the stem
            let kept = truncate_at_char_boundary(&self.0, MAX_FILENAME_BYTES - suffix.len());
            return Self(format!("{kept}{suffix}"));
        }
        Self(format!("{kept}{suffix}{ext}"))
    }
}

/// Longest prefix of `s` that is at most `max` bytes and ends on a char boundary
fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let end = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    &s[..end]
}

impl fmt::Display for DestinationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
