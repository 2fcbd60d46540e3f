//! View side of image uploads
//!
//! A paste inserts a placeholder keyed by a correlation token. The host
//! answers with the token, so results may arrive in any order. Placeholders
//! also carry a per-relay nonce so ones left in the document by an earlier
//! session are never taken for ours.

use std::collections::HashSet;

use md_web_protocol::{CommandName, Envelope, ProtocolError, UploadRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// New document content with the placeholder substituted
    Replaced(String),
    /// The user deleted the placeholder before the result arrived
    PlaceholderGone,
    UnknownToken,
}

#[derive(Debug)]
pub struct UploadRelay {
    nonce: String,
    next_token: u64,
    pending: HashSet<u64>,
}

impl Default for UploadRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadRelay {
    pub fn new() -> Self {
        let mut nonce = uuid::Uuid::new_v4().simple().to_string();
        nonce.truncate(8);
        Self {
            nonce,
            next_token: 0,
            pending: HashSet::new(),
        }
    }

    /// Allocate a token for a new upload
    pub fn begin(&mut self) -> u64 {
        self.next_token += 1;
        self.pending.insert(self.next_token);
        self.next_token
    }

    pub fn placeholder(&self, token: u64) -> String {
        format!("![uploading-{}-{token}]()", self.nonce)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Swap the token's placeholder for an image reference
    pub fn resolve(&mut self, content: &str, token: u64, uri: &str) -> Settled {
        self.settle(content, token, &format!("![]({uri})"))
    }

    /// Remove the token's placeholder
    pub fn fail(&mut self, content: &str, token: u64) -> Settled {
        self.settle(content, token, "")
    }

    fn settle(&mut self, content: &str, token: u64, replacement: &str) -> Settled {
        if !self.pending.remove(&token) {
            return Settled::UnknownToken;
        }
        let placeholder = self.placeholder(token);
        if content.contains(&placeholder) {
            Settled::Replaced(content.replacen(&placeholder, replacement, 1))
        } else {
            Settled::PlaceholderGone
        }
    }
}

/// Encode an `img` frame off the event loop
pub async fn encode_upload(request: UploadRequest) -> Result<Vec<u8>, ProtocolError> {
    tokio::task::spawn_blocking(move || Envelope::from_value(CommandName::Img, request.into_value()).encode())
        .await
        .map_err(|e| ProtocolError::Encode(e.to_string()))?
}
