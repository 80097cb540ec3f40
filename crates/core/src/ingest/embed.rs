use anyhow::{bail, Context};
use base64::Engine;
use serde::Serialize;
use std::path::Path;

const DATA_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentSlot {
    Pdf,
    Spreadsheet,
    Logo,
}

impl AttachmentSlot {
    pub const ALL: [AttachmentSlot; 3] = [
        AttachmentSlot::Pdf,
        AttachmentSlot::Spreadsheet,
        AttachmentSlot::Logo,
    ];

    /// Name of the upload control for this slot.
    pub fn form_name(self) -> &'static str {
        match self {
            AttachmentSlot::Pdf => "pdf",
            AttachmentSlot::Spreadsheet => "excel",
            AttachmentSlot::Logo => "logo",
        }
    }

    pub fn from_form_name(name: &str) -> Option<Self> {
        AttachmentSlot::ALL.into_iter().find(|s| s.form_name() == name)
    }

    pub fn accepts(self, file_name: &str) -> bool {
        let ext = extension(file_name);
        match self {
            AttachmentSlot::Pdf => ext.as_deref() == Some("pdf"),
            AttachmentSlot::Spreadsheet => matches!(ext.as_deref(), Some("xlsx" | "xls")),
            AttachmentSlot::Logo => media_type_for_name(file_name).starts_with("image/"),
        }
    }
}

/// A file's bytes inlined as a `data:` URL together with its display name.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFile {
    pub name: String,
    pub media_type: String,
    pub data_url: String,
}

impl EmbeddedFile {
    /// A declared media type wins over the one guessed from the file name.
    pub fn from_bytes(name: &str, declared_media_type: Option<&str>, bytes: &[u8]) -> Self {
        let media_type = declared_media_type
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != FALLBACK_MEDIA_TYPE)
            .map(str::to_string)
            .unwrap_or_else(|| media_type_for_name(name).to_string());

        let data_url = encode_data_url(&media_type, bytes);
        Self {
            name: name.to_string(),
            media_type,
            data_url,
        }
    }
}

pub fn encode_data_url(media_type: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("{DATA_PREFIX}{media_type}{BASE64_MARKER}{encoded}")
}

/// Returns the media type and payload of a base64 `data:` URL.
pub fn decode_data_url(url: &str) -> anyhow::Result<(String, Vec<u8>)> {
    let Some(rest) = url.strip_prefix(DATA_PREFIX) else {
        bail!("not a data URL");
    };
    let Some((media_type, payload)) = rest.split_once(BASE64_MARKER) else {
        bail!("data URL is not base64-encoded");
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("data URL payload is not valid base64")?;
    Ok((media_type.to_string(), bytes))
}

pub fn media_type_for_name(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        _ => FALLBACK_MEDIA_TYPE,
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// How a stored `pdfUrl`/`excelUrl`/`logoUrl` value should be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentRef<'a> {
    Missing,
    Embedded { media_type: &'a str },
    External(&'a str),
}

impl<'a> AttachmentRef<'a> {
    pub fn parse(value: &'a str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return AttachmentRef::Missing;
        }
        match value.strip_prefix(DATA_PREFIX) {
            Some(rest) => AttachmentRef::Embedded {
                media_type: rest.split([';', ',']).next().unwrap_or_default(),
            },
            None => AttachmentRef::External(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadLink {
    pub href: String,
    pub download_name: String,
    pub embedded: bool,
}

/// The same link shape for embedded and external references. Relative references are
/// resolved against the site root.
pub fn download_link(title: &str, slot: AttachmentSlot, value: &str) -> Option<DownloadLink> {
    let download_name = match slot {
        AttachmentSlot::Pdf => format!("{title} - Research Report.pdf"),
        AttachmentSlot::Spreadsheet => format!("{title} - Financial Model.xlsx"),
        AttachmentSlot::Logo => format!("{title} logo"),
    };

    match AttachmentRef::parse(value) {
        AttachmentRef::Missing => None,
        AttachmentRef::Embedded { .. } => Some(DownloadLink {
            href: value.trim().to_string(),
            download_name,
            embedded: true,
        }),
        AttachmentRef::External(url) => {
            let href = if url.starts_with('/') || url.contains("://") {
                url.to_string()
            } else {
                format!("/{url}")
            };
            Some(DownloadLink {
                href,
                download_name,
                embedded: false,
            })
        }
    }
}
