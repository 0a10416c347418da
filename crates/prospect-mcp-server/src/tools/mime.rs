//! Plain-text RFC 822 messages for Gmail's `raw` upload field.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use prospect_dispatch::ToolError;

/// Payload bytes per RFC 2047 encoded word. 45 bytes become 60 base64
/// characters, which keeps each word under the 75 character limit.
const ENCODED_WORD_BYTES: usize = 45;

#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

impl OutgoingMessage {
    /// Header block plus body. Header values carrying CR or LF are rejected
    /// so callers cannot smuggle extra headers into the message.
    pub fn render(&self) -> Result<String, ToolError> {
        let mut message = String::new();
        push_header(&mut message, "To", &self.to)?;
        if !self.cc.is_empty() {
            for cc in &self.cc {
                reject_line_breaks("Cc", cc)?;
            }
            push_header(&mut message, "Cc", &self.cc.join(", "))?;
        }
        reject_line_breaks("Subject", &self.subject)?;
        message.push_str(&format!("Subject: {}\r\n", encode_header_text(&self.subject)));
        if let Some(id) = &self.in_reply_to {
            push_header(&mut message, "In-Reply-To", id)?;
        }
        if let Some(references) = &self.references {
            push_header(&mut message, "References", references)?;
        }
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
        message.push_str(&self.body);
        Ok(message)
    }

    /// base64url form expected by `messages.send` and `drafts.create`.
    pub fn to_raw(&self) -> Result<String, ToolError> {
        Ok(URL_SAFE.encode(self.render()?))
    }
}

fn push_header(message: &mut String, name: &str, value: &str) -> Result<(), ToolError> {
    reject_line_breaks(name, value)?;
    message.push_str(&format!("{name}: {value}\r\n"));
    Ok(())
}

fn reject_line_breaks(name: &str, value: &str) -> Result<(), ToolError> {
    if value.contains(['\r', '\n']) {
        return Err(ToolError::InvalidParameters(format!(
            "{name} must not contain line breaks"
        )));
    }
    Ok(())
}

/// ASCII passes through. Anything else becomes folded `=?UTF-8?B?...?=`
/// words, split on character boundaries.
fn encode_header_text(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in text.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }
    words.join("\r\n ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk))
}
