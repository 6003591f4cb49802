//! Profile pictures: a named default icon or an inline image.

use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::Path;

/// Icon ids accepted in `default:<id>` form, with their display labels
pub const DEFAULT_ICONS: &[(&str, &str)] = &[
    ("user", "Default"),
    ("user-circle", "Circle"),
    ("contact", "Contact"),
    ("smile", "Happy"),
    ("meh", "Neutral"),
    ("frown", "Sad"),
    ("users", "Group"),
    ("contact-round", "Profile"),
];

const DEFAULT_PREFIX: &str = "default:";

/// Inline avatars larger than this are refused
pub const MAX_INLINE_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Avatar {
    Icon(String),
    Inline { mime: String, data: Vec<u8> },
}

impl Avatar {
    /// Parse the stored string form
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(id) = s.strip_prefix(DEFAULT_PREFIX) {
            if !DEFAULT_ICONS.iter().any(|(icon, _)| *icon == id) {
                bail!("Unknown default avatar '{}'", id);
            }
            return Ok(Avatar::Icon(id.to_string()));
        }

        let rest = s
            .strip_prefix("data:")
            .ok_or_else(|| anyhow!("Avatar must be 'default:<icon>' or a data URL"))?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| anyhow!("Avatar data URL must be base64 encoded"))?;
        if !mime.starts_with("image/") {
            bail!("Avatar must be an image, got '{}'", mime);
        }
        let data = STANDARD.decode(payload)?;
        Ok(Avatar::Inline {
            mime: mime.to_string(),
            data,
        })
    }

    /// Read an image file into an inline avatar
    pub fn from_file(path: &Path) -> Result<Self> {
        let mime = image_mime(path)
            .ok_or_else(|| anyhow!("Please select an image file: {}", path.display()))?;
        let data = std::fs::read(path)?;
        if data.len() > MAX_INLINE_BYTES {
            bail!(
                "Avatar image is {} bytes, limit is {}",
                data.len(),
                MAX_INLINE_BYTES
            );
        }
        Ok(Avatar::Inline {
            mime: mime.to_string(),
            data,
        })
    }

    /// Stored string form
    pub fn encode(&self) -> String {
        match self {
            Avatar::Icon(id) => format!("{}{}", DEFAULT_PREFIX, id),
            Avatar::Inline { mime, data } => {
                format!("data:{};base64,{}", mime, STANDARD.encode(data))
            }
        }
    }

    /// Short human description for terminal output
    pub fn describe(&self) -> String {
        match self {
            Avatar::Icon(id) => {
                let label = DEFAULT_ICONS
                    .iter()
                    .find(|(icon, _)| *icon == id.as_str())
                    .map(|(_, label)| *label)
                    .unwrap_or("Icon");
                format!("{} icon ({})", label, id)
            }
            Avatar::Inline { mime, data } => format!("{} image, {} bytes", mime, data.len()),
        }
    }
}

/// Two-letter initials shown when no avatar is set
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|part| part.chars().next())
        .take(2)
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// MIME type for the image extensions the app accepts
pub fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
