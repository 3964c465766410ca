//! Per-recipient message assembly.
//!
//! Output is a pure function of the job and the recipient: boundaries, the Date header and
//! the Message-ID are all derived from the job, so building twice yields identical bytes.
//! Blind copies are only ever written to the envelope.

use crate::adapters::smtp::OutboundMessage;
use crate::domain::job::{AttachmentFile, BulkJob};
use lettre::address::Envelope;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};
use sha2::{Digest, Sha256};
use std::time::SystemTime;
use thiserror::Error;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid {field} address '{value}': {reason}")]
    InvalidAddress { field: &'static str, value: String, reason: String },
    #[error("could not assemble message: {0}")]
    Assembly(String),
}

/// Parses one address of the given header role.
///
/// # Errors
/// Returns `BuildError::InvalidAddress` if `value` is not a valid mailbox.
pub fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox, BuildError> {
    value.trim().parse::<Mailbox>().map_err(|e| BuildError::InvalidAddress {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Builds the message a single recipient of `job` receives.
///
/// # Errors
/// Returns `BuildError::InvalidAddress` if any address cannot be parsed and
/// `BuildError::Assembly` if the MIME structure cannot be produced.
pub fn build_message(sender: &str, job: &BulkJob, recipient: &str) -> Result<OutboundMessage, BuildError> {
    let from = parse_mailbox("sender", sender)?;
    let to = parse_mailbox("recipient", recipient)?;
    let cc = job.request.cc.iter().map(|a| parse_mailbox("cc", a)).collect::<Result<Vec<_>, _>>()?;
    let bcc = job.request.bcc.iter().map(|a| parse_mailbox("bcc", a)).collect::<Result<Vec<_>, _>>()?;

    let envelope = envelope_for(&from, &to, &cc, &bcc)?;

    let mut builder = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(job.request.subject.clone())
        .date(SystemTime::from(job.started_at))
        .message_id(Some(message_id(job, &from.email, recipient)))
        .envelope(envelope.clone());
    for mailbox in cc {
        builder = builder.cc(mailbox);
    }

    let message = match compose_body(job)? {
        Content::Single(part) => builder.singlepart(part),
        Content::Multi(part) => builder.multipart(part),
    }
    .map_err(|e| BuildError::Assembly(e.to_string()))?;

    Ok(OutboundMessage { envelope, formatted: message.formatted() })
}

enum Content {
    Single(SinglePart),
    Multi(MultiPart),
}

fn compose_body(job: &BulkJob) -> Result<Content, BuildError> {
    let plain = SinglePart::plain(job.request.plain_body.clone());
    let text = match job.request.html_body() {
        Some(html) => Content::Multi(
            MultiPart::alternative()
                .boundary(boundary(job, "alt"))
                .singlepart(plain)
                .singlepart(SinglePart::html(html.to_string())),
        ),
        None => Content::Single(plain),
    };

    if job.request.attachments.is_empty() {
        return Ok(text);
    }

    let mixed = MultiPart::mixed().boundary(boundary(job, "mixed"));
    let mut mixed = match text {
        Content::Single(part) => mixed.singlepart(part),
        Content::Multi(part) => mixed.multipart(part),
    };
    for attachment in &job.request.attachments {
        mixed = mixed.singlepart(attachment_part(attachment)?);
    }
    Ok(Content::Multi(mixed))
}

fn attachment_part(attachment: &AttachmentFile) -> Result<SinglePart, BuildError> {
    let content_type = attachment
        .content_type
        .as_deref()
        .and_then(|declared| ContentType::parse(declared).ok())
        .map_or_else(|| ContentType::parse(OCTET_STREAM), Ok)
        .map_err(|e| BuildError::Assembly(e.to_string()))?;

    let body = Body::new_with_encoding(attachment.data.to_vec(), ContentTransferEncoding::Base64)
        .map_err(|_| BuildError::Assembly(format!("cannot encode attachment '{}'", attachment.filename)))?;

    Ok(Attachment::new(attachment.filename.clone()).body(body, content_type))
}

fn envelope_for(from: &Mailbox, to: &Mailbox, cc: &[Mailbox], bcc: &[Mailbox]) -> Result<Envelope, BuildError> {
    let mut recipients: Vec<Address> = Vec::with_capacity(1 + cc.len() + bcc.len());
    for mailbox in std::iter::once(to).chain(cc).chain(bcc) {
        if !recipients.contains(&mailbox.email) {
            recipients.push(mailbox.email.clone());
        }
    }
    Envelope::new(Some(from.email.clone()), recipients).map_err(|e| BuildError::Assembly(e.to_string()))
}

fn boundary(job: &BulkJob, kind: &str) -> String {
    format!("{kind}-{}", job.id.simple())
}

fn message_id(job: &BulkJob, sender: &Address, recipient: &str) -> String {
    let digest = hex::encode(Sha256::digest(recipient.trim().to_lowercase().as_bytes()));
    format!("<{}.{}@{}>", job.id.simple(), &digest[..16], sender.domain())
}
