//! Resolution of user-supplied image references. A reference is either a
//! remote URL, forwarded untouched, or a path on the local filesystem whose
//! bytes are embedded into the request as a base 64 `data:` URI

use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Subtype used for every locally resolved image, whatever its content
pub const LOCAL_IMAGE_SUBTYPE: &str = "jpeg";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot read image file {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An image reference after resolution, ready to be placed in a payload
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedImage {
    /// A remote URL, passed through as given
    Remote(String),

    /// A `data:image/<subtype>;base64,<payload>` string
    Embedded(String),
}

impl ResolvedImage {
    pub fn into_string(self) -> String {
        match self {
            ResolvedImage::Remote(s) | ResolvedImage::Embedded(s) => s,
        }
    }
}

impl fmt::Debug for ResolvedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedImage::Remote(url) => write!(f, "Remote({url:?})"),
            ResolvedImage::Embedded(data) => {
                write!(f, "Embedded(<data: {} bytes>)", data.len())
            }
        }
    }
}

impl From<ResolvedImage> for serde_json::Value {
    fn from(image: ResolvedImage) -> Self {
        serde_json::Value::String(image.into_string())
    }
}

/// Whether `reference` is a URL with both a scheme and a network location,
/// split by the generic RFC 3986 grammar (`scheme ":" "//" authority`).
/// Hosts and ports are not validated. Malformed input is just not a URL.
pub fn is_remote(reference: &str) -> bool {
    let cleaned: String = reference
        .trim_start_matches(|c: char| c <= ' ')
        .chars()
        .filter(|c| !matches!(c, '\t' | '\r' | '\n'))
        .collect();

    let Some((scheme, rest)) = cleaned.split_once(':') else {
        return false;
    };
    let valid_scheme = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid_scheme {
        return false;
    }

    let Some(after_slashes) = rest.strip_prefix("//") else {
        return false;
    };
    let authority = after_slashes
        .split(&['/', '?', '#'][..])
        .next()
        .unwrap_or_default();

    // an unbalanced IPv6 bracket makes the whole reference unparseable
    if authority.contains('[') != authority.contains(']') {
        return false;
    }
    !authority.is_empty()
}

/// Wrap raw bytes as a `data:image/<subtype>;base64,...` URI
pub fn encode_data_uri(subtype: &str, bytes: &[u8]) -> String {
    format!(
        "data:image/{subtype};base64,{}",
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Image subtype for an uploaded file: everything after the last `.` of its
/// name, or the whole name when there is none
pub fn subtype_from_filename(filename: &str) -> &str {
    filename.rsplit('.').next().unwrap_or(filename)
}

/// Resolve a reference to something the inference provider accepts
pub async fn resolve(reference: &str) -> Result<ResolvedImage, ResolveError> {
    if is_remote(reference) {
        debug!("forwarding remote image {reference}");
        return Ok(ResolvedImage::Remote(reference.to_string()));
    }

    let path = PathBuf::from(reference);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| ResolveError::FileAccess {
            path: path.clone(),
            source,
        })?;

    debug!(
        "embedding local image {} ({} bytes)",
        path.display(),
        bytes.len()
    );
    Ok(ResolvedImage::Embedded(encode_data_uri(
        LOCAL_IMAGE_SUBTYPE,
        &bytes,
    )))
}
