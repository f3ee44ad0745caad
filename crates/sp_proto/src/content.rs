//! Message content — the payload sealed inside a SecureMessage.
//!
//! Content is a closed set of variants. The messaging core only ever needs
//! the discriminator (`content_type`) and the canonical byte form; anything
//! variant-specific is for the host application.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{codec, error::ProtoError, id::Id, message::CertifiedMessage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Serial number, a dedup/ordering hint chosen by the sender.
    pub sn: u64,
    /// Group the content belongs to, when sent to a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Id>,
    #[serde(flatten)]
    pub body: ContentBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBody {
    Text {
        text: String,
    },
    File {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Inline file bytes, for small files only.
        #[serde(default, skip_serializing_if = "Option::is_none", with = "codec::b64_opt")]
        data: Option<Vec<u8>>,
    },
    Image {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none", with = "codec::b64_opt")]
        thumbnail: Option<Vec<u8>>,
    },
    Audio {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u32>,
    },
    Video {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none", with = "codec::b64_opt")]
        snapshot: Option<Vec<u8>>,
    },
    Webpage {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        desc: Option<String>,
    },
    /// Reply quoting an earlier message by its serial number.
    Quote {
        text: String,
        original_sn: u64,
        original_sender: Id,
    },
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        args: BTreeMap<String, serde_json::Value>,
    },
    /// A certified message relayed verbatim; its signature stays checkable.
    Forward {
        message: Box<CertifiedMessage>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Text,
    File,
    Image,
    Audio,
    Video,
    Webpage,
    Quote,
    Command,
    Forward,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Webpage => "webpage",
            Self::Quote => "quote",
            Self::Command => "command",
            Self::Forward => "forward",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ContentBody {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text { .. } => ContentType::Text,
            Self::File { .. } => ContentType::File,
            Self::Image { .. } => ContentType::Image,
            Self::Audio { .. } => ContentType::Audio,
            Self::Video { .. } => ContentType::Video,
            Self::Webpage { .. } => ContentType::Webpage,
            Self::Quote { .. } => ContentType::Quote,
            Self::Command { .. } => ContentType::Command,
            Self::Forward { .. } => ContentType::Forward,
        }
    }
}

impl Content {
    /// New content with a random serial number.
    pub fn new(body: ContentBody) -> Self {
        let sn = u64::from(rand::thread_rng().gen::<u32>());
        Self { sn, group: None, body }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ContentBody::Text { text: text.into() })
    }

    pub fn command(command: impl Into<String>, args: BTreeMap<String, serde_json::Value>) -> Self {
        Self::new(ContentBody::Command { command: command.into(), args })
    }

    pub fn forward(message: CertifiedMessage) -> Self {
        Self::new(ContentBody::Forward { message: Box::new(message) })
    }

    pub fn with_serial_number(mut self, sn: u64) -> Self {
        self.sn = sn;
        self
    }

    pub fn in_group(mut self, group: Id) -> Self {
        self.group = Some(group);
        self
    }

    pub fn content_type(&self) -> ContentType {
        self.body.content_type()
    }

    /// Canonical byte form. Field order is fixed by declaration and attribute
    /// maps are sorted, so equal content always encodes to equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
