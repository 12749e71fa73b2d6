//! Response templating boundary.
//!
//! The gateway only needs `render(template, fields) -> markup`. [`Renderer`] is
//! that capability; [`XmlRenderer`] is the built-in implementation covering the
//! encrypted envelope and plain platform replies. Field names are logical
//! (`to_user_name`) and map to tags with [`to_tag_name`].

use std::collections::BTreeMap;

use thiserror::Error;

use crate::message::naming::to_tag_name;

/// Template name of the encrypted reply envelope.
pub const ENCRYPT_TEMPLATE: &str = "encrypt";

/// Field values handed to a renderer, keyed by logical name.
pub type Fields = BTreeMap<String, String>;

/// Fields of the encrypted envelope, in output order.
const ENVELOPE_FIELDS: [&str; 4] = ["encrypt", "msg_signature", "time_stamp", "nonce"];

/// Addressing fields every reply message starts with, in output order.
const HEADER_FIELDS: [&str; 3] = ["to_user_name", "from_user_name", "create_time"];

/// Fields written without a CDATA section when they hold only digits.
const NUMERIC_FIELDS: [&str; 2] = ["create_time", "time_stamp"];

/// Errors produced while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template name is not one this renderer can produce.
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    /// A field the template requires was not supplied.
    #[error("template `{template}` requires field `{field}`")]
    MissingField { template: String, field: String },

    /// A field name that cannot be written as a tag.
    #[error("invalid field name: {0}")]
    InvalidFieldName(String),
}

/// Produces response markup from a template name and field values.
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, fields: &Fields) -> Result<String, RenderError>;
}

/// Renders platform reply markup directly, without a template engine.
///
/// - [`ENCRYPT_TEMPLATE`] → `Encrypt`, `MsgSignature`, `TimeStamp`, `Nonce`.
/// - Any other name is a message type (`text`, `image`, ...): the three
///   addressing fields, `MsgType` set to the template name, then the remaining
///   fields in name order.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlRenderer;

impl Renderer for XmlRenderer {
    fn render(&self, template: &str, fields: &Fields) -> Result<String, RenderError> {
        if template == ENCRYPT_TEMPLATE {
            let mut out = String::from("<xml>");
            for name in ENVELOPE_FIELDS {
                write_element(&mut out, name, require(template, fields, name)?)?;
            }
            out.push_str("</xml>");
            return Ok(out);
        }

        if !is_tag_safe(template) {
            return Err(RenderError::UnknownTemplate(template.to_owned()));
        }

        let mut out = String::from("<xml>");
        for name in HEADER_FIELDS {
            write_element(&mut out, name, require(template, fields, name)?)?;
        }
        write_element(&mut out, "msg_type", template)?;
        for (name, value) in fields {
            if !HEADER_FIELDS.contains(&name.as_str()) && name != "msg_type" {
                write_element(&mut out, name, value)?;
            }
        }
        out.push_str("</xml>");
        Ok(out)
    }
}

fn require<'a>(template: &str, fields: &'a Fields, name: &str) -> Result<&'a str, RenderError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| RenderError::MissingField {
            template: template.to_owned(),
            field: name.to_owned(),
        })
}

/// Non-empty, not starting with a digit, and limited to ASCII alphanumerics and `_`.
fn is_tag_safe(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_element(out: &mut String, name: &str, value: &str) -> Result<(), RenderError> {
    let tag = to_tag_name(name);
    if !is_tag_safe(&tag) {
        return Err(RenderError::InvalidFieldName(name.to_owned()));
    }
    out.push('<');
    out.push_str(&tag);
    out.push('>');
    if NUMERIC_FIELDS.contains(&name) && !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        out.push_str(value);
    } else {
        out.push_str("<![CDATA[");
        out.push_str(&value.replace("]]>", "]]]]><![CDATA[>"));
        out.push_str("]]>");
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
    Ok(())
}
