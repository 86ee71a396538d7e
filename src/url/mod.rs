//! URL handling module for Site-Auditor
//!
//! This module provides URL normalization, same-site detection and
//! file-extension based resource classification.

mod domain;
mod normalize;

use url::Url;

// Re-export main functions
pub use domain::{is_same_site, origin_of, same_site};
pub use normalize::normalize_url;

/// Category of a downloadable (non-HTML) resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Pdf,
    Document,
    Spreadsheet,
    Presentation,
    Archive,
    Image,
    Other,
}

impl ResourceType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Presentation => "presentation",
            Self::Archive => "archive",
            Self::Image => "image",
            Self::Other => "other",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(Self::Pdf),
            "document" => Some(Self::Document),
            "spreadsheet" => Some(Self::Spreadsheet),
            "presentation" => Some(Self::Presentation),
            "archive" => Some(Self::Archive),
            "image" => Some(Self::Image),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Result of classifying a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// An HTML page: fetched, parsed and checked
    Page,
    /// A downloadable resource: recorded but never checked
    Resource(ResourceType),
}

impl ResourceKind {
    pub fn resource_type(&self) -> Option<ResourceType> {
        match self {
            Self::Page => None,
            Self::Resource(kind) => Some(*kind),
        }
    }
}

/// Extension table used by [`classify_resource`]
const EXTENSION_TABLE: &[(&str, ResourceType)] = &[
    ("pdf", ResourceType::Pdf),
    ("doc", ResourceType::Document),
    ("docx", ResourceType::Document),
    ("odt", ResourceType::Document),
    ("rtf", ResourceType::Document),
    ("txt", ResourceType::Document),
    ("xls", ResourceType::Spreadsheet),
    ("xlsx", ResourceType::Spreadsheet),
    ("ods", ResourceType::Spreadsheet),
    ("csv", ResourceType::Spreadsheet),
    ("ppt", ResourceType::Presentation),
    ("pptx", ResourceType::Presentation),
    ("odp", ResourceType::Presentation),
    ("key", ResourceType::Presentation),
    ("zip", ResourceType::Archive),
    ("rar", ResourceType::Archive),
    ("7z", ResourceType::Archive),
    ("tar", ResourceType::Archive),
    ("gz", ResourceType::Archive),
    ("tgz", ResourceType::Archive),
    ("bz2", ResourceType::Archive),
    ("jpg", ResourceType::Image),
    ("jpeg", ResourceType::Image),
    ("png", ResourceType::Image),
    ("gif", ResourceType::Image),
    ("webp", ResourceType::Image),
    ("svg", ResourceType::Image),
    ("bmp", ResourceType::Image),
    ("ico", ResourceType::Image),
    ("tif", ResourceType::Image),
    ("tiff", ResourceType::Image),
    ("avif", ResourceType::Image),
    ("mp3", ResourceType::Other),
    ("mp4", ResourceType::Other),
    ("mov", ResourceType::Other),
    ("avi", ResourceType::Other),
    ("wav", ResourceType::Other),
    ("webm", ResourceType::Other),
    ("exe", ResourceType::Other),
    ("dmg", ResourceType::Other),
    ("apk", ResourceType::Other),
    ("epub", ResourceType::Other),
];

/// Classifies a URL as an HTML page or a downloadable resource
///
/// Only the extension of the last path segment is considered; the query
/// string is ignored. Unknown extensions and extension-less paths classify
/// as [`ResourceKind::Page`].
///
/// # Examples
///
/// ```
/// use url::Url;
/// use site_auditor::url::{classify_resource, ResourceKind, ResourceType};
///
/// let pdf = Url::parse("https://example.com/files/Report.PDF?dl=1").unwrap();
/// assert_eq!(classify_resource(&pdf), ResourceKind::Resource(ResourceType::Pdf));
///
/// let page = Url::parse("https://example.com/about").unwrap();
/// assert_eq!(classify_resource(&page), ResourceKind::Page);
/// ```
pub fn classify_resource(url: &Url) -> ResourceKind {
    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    let extension = match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return ResourceKind::Page,
    };

    EXTENSION_TABLE
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, kind)| ResourceKind::Resource(*kind))
        .unwrap_or(ResourceKind::Page)
}
