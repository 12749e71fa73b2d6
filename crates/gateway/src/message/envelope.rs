//! [`Envelope`]: read-only access to a decoded callback message.
//!
//! The payload is parsed once, at construction, into a [`MessageNode`] tree.
//! Field lookups go through a per-envelope cache keyed by tag name, so repeated
//! reads of the same field never walk the tree twice.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

use super::naming::to_tag_name;

const TAG_MSG_TYPE: &str = "MsgType";
const TAG_EVENT: &str = "Event";
const TAG_EVENT_KEY: &str = "EventKey";
const TAG_MSG_ID: &str = "MsgId";

/// Errors from envelope construction and field access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The payload is not well-formed markup.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The payload has no element with this tag name.
    #[error("field not found: {0}")]
    FieldNotFound(String),
}

fn malformed(reason: impl std::fmt::Display) -> EnvelopeError {
    EnvelopeError::MalformedPayload(reason.to_string())
}

/// One element of a decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageNode {
    tag: String,
    text: String,
    children: Vec<MessageNode>,
}

impl MessageNode {
    fn new(tag: String) -> Self {
        Self {
            tag,
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Element name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Concatenated text and CDATA content directly inside this element.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Child elements in document order.
    pub fn children(&self) -> &[MessageNode] {
        &self.children
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&MessageNode> {
        self.children.iter().find(|c| c.tag == tag)
    }
}

/// A parsed callback message.
#[derive(Debug)]
pub struct Envelope {
    raw: String,
    root: MessageNode,
    cache: Mutex<HashMap<String, String>>,
}

impl Envelope {
    /// Parse a payload into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MalformedPayload`] if the payload is not UTF-8,
    /// is not well-formed, or has no single root element.
    pub fn parse(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let raw = std::str::from_utf8(payload).map_err(malformed)?.to_owned();
        let root = parse_tree(&raw)?;
        Ok(Self {
            raw,
            root,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// The payload the envelope was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The root element (`<xml>` for platform messages).
    pub fn root(&self) -> &MessageNode {
        &self.root
    }

    /// Read a field by logical name, e.g. `from_user_name` → `<FromUserName>`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::FieldNotFound`] with the resolved tag name if
    /// the message has no such element.
    pub fn get_field(&self, name: &str) -> Result<String, EnvelopeError> {
        self.tag(&to_tag_name(name))
    }

    /// Read a field by its exact tag name.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::FieldNotFound`] if the message has no such element.
    pub fn tag(&self, tag: &str) -> Result<String, EnvelopeError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = cache.get(tag) {
            return Ok(value.clone());
        }
        let value = self
            .root
            .child(tag)
            .map(|node| node.text().to_owned())
            .ok_or_else(|| EnvelopeError::FieldNotFound(tag.to_owned()))?;
        cache.insert(tag.to_owned(), value.clone());
        Ok(value)
    }

    /// Whether the message has an element with this tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.root.child(tag).is_some()
    }

    pub fn from_user_name(&self) -> Result<String, EnvelopeError> {
        self.get_field("from_user_name")
    }

    pub fn to_user_name(&self) -> Result<String, EnvelopeError> {
        self.get_field("to_user_name")
    }

    pub fn create_time(&self) -> Result<String, EnvelopeError> {
        self.get_field("create_time")
    }

    /// The type callers dispatch on.
    ///
    /// `MsgType`, replaced by `Event` when it is `event`, then replaced by
    /// `EventKey` when the value at that point is `click`. Comparisons are
    /// case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::FieldNotFound`] if a tag the chain needs is absent.
    pub fn message_type(&self) -> Result<String, EnvelopeError> {
        let mut msg_type = self.tag(TAG_MSG_TYPE)?;
        if msg_type == "event" {
            msg_type = self.tag(TAG_EVENT)?;
        }
        if msg_type == "click" {
            msg_type = self.tag(TAG_EVENT_KEY)?;
        }
        Ok(msg_type)
    }

    /// A stable identifier for de-duplicating redeliveries.
    ///
    /// `MsgId` when present, otherwise `{FromUserName}-{message_type}@{CreateTime}`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::FieldNotFound`] if the id must be synthesised
    /// and one of its parts is absent.
    pub fn message_id(&self) -> Result<String, EnvelopeError> {
        if self.has_tag(TAG_MSG_ID) {
            return self.tag(TAG_MSG_ID);
        }
        Ok(format!(
            "{}-{}@{}",
            self.from_user_name()?,
            self.message_type()?,
            self.create_time()?
        ))
    }
}

/// Build the element tree for `xml`, rejecting anything but a single root.
fn parse_tree(xml: &str) -> Result<MessageNode, EnvelopeError> {
    // Text is kept verbatim; whitespace between elements lands in the parent's text.
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<MessageNode> = Vec::new();
    let mut root: Option<MessageNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if root.is_some() {
                    return Err(malformed("content after the root element"));
                }
                let tag = String::from_utf8_lossy(e.local_name().into_inner()).into_owned();
                stack.push(MessageNode::new(tag));
            }
            Ok(Event::Empty(ref e)) => {
                let tag = String::from_utf8_lossy(e.local_name().into_inner()).into_owned();
                attach(&mut stack, &mut root, MessageNode::new(tag))?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(malformed)?;
                append_text(&mut stack, &text)?;
            }
            Ok(Event::CData(ref e)) => {
                let text = std::str::from_utf8(e).map_err(malformed)?;
                append_text(&mut stack, text)?;
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or_else(|| malformed("unbalanced end tag"))?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions, doctypes.
            Ok(_) => {}
            Err(e) => return Err(malformed(e)),
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("unclosed element <{}>", open.tag)));
    }
    root.ok_or_else(|| malformed("no root element"))
}

fn attach(
    stack: &mut [MessageNode],
    root: &mut Option<MessageNode>,
    node: MessageNode,
) -> Result<(), EnvelopeError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_some() => return Err(malformed("multiple root elements")),
        None => *root = Some(node),
    }
    Ok(())
}

fn append_text(stack: &mut [MessageNode], text: &str) -> Result<(), EnvelopeError> {
    match stack.last_mut() {
        Some(node) => {
            node.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(malformed("text outside the root element")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_MESSAGE: &str = "<xml>\
        <ToUserName><![CDATA[gh_7f083739789a]]></ToUserName>\
        <FromUserName><![CDATA[oia2TjuEGTNoeX76QEjQNrcURxG8]]></FromUserName>\
        <CreateTime>1407743423</CreateTime>\
        <MsgType><![CDATA[text]]></MsgType>\
        <Content><![CDATA[hello & <world>]]></Content>\
        <MsgId>6045765409218158849</MsgId>\
        <AgentID>1</AgentID>\
        </xml>";

    fn click_event(event: &str, key: &str) -> String {
        format!(
            "<xml>\
             <ToUserName><![CDATA[gh_7f083739789a]]></ToUserName>\
             <FromUserName><![CDATA[oia2TjuEGTNoeX76QEjQNrcURxG8]]></FromUserName>\
             <CreateTime>1407743423</CreateTime>\
             <MsgType><![CDATA[event]]></MsgType>\
             <Event><![CDATA[{event}]]></Event>\
             <EventKey><![CDATA[{key}]]></EventKey>\
             </xml>"
        )
    }

    #[test]
    fn reads_fields_by_logical_name() {
        let env = Envelope::parse(TEXT_MESSAGE.as_bytes()).unwrap();
        assert_eq!(env.to_user_name().unwrap(), "gh_7f083739789a");
        assert_eq!(env.from_user_name().unwrap(), "oia2TjuEGTNoeX76QEjQNrcURxG8");
        assert_eq!(env.create_time().unwrap(), "1407743423");
        assert_eq!(env.get_field("content").unwrap(), "hello & <world>");
        assert_eq!(env.get_field("agent_i_d").unwrap(), "1");
    }

    #[test]
    fn agent_id_mapping_misses_the_platform_tag() {
        let env = Envelope::parse(TEXT_MESSAGE.as_bytes()).unwrap();
        assert_eq!(
            env.get_field("agent_id"),
            Err(EnvelopeError::FieldNotFound("AgentId".into()))
        );
        assert_eq!(env.tag("AgentID").unwrap(), "1");
    }

    #[test]
    fn missing_field_is_an_error() {
        let env = Envelope::parse(TEXT_MESSAGE.as_bytes()).unwrap();
        assert_eq!(
            env.get_field("pic_url"),
            Err(EnvelopeError::FieldNotFound("PicUrl".into()))
        );
    }

    #[test]
    fn lookups_are_memoised() {
        let env = Envelope::parse(TEXT_MESSAGE.as_bytes()).unwrap();
        assert!(env.cache.lock().unwrap().is_empty());
        env.get_field("msg_type").unwrap();
        env.tag("MsgType").unwrap();
        let cache = env.cache.lock().unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("MsgType").map(String::as_str), Some("text"));
    }

    #[test]
    fn plain_message_type() {
        let env = Envelope::parse(TEXT_MESSAGE.as_bytes()).unwrap();
        assert_eq!(env.message_type().unwrap(), "text");
    }

    #[test]
    fn click_event_resolves_to_event_key() {
        let env = Envelope::parse(click_event("click", "MENU1").as_bytes()).unwrap();
        assert_eq!(env.message_type().unwrap(), "MENU1");
    }

    #[test]
    fn other_events_resolve_to_event_name() {
        let env = Envelope::parse(click_event("subscribe", "").as_bytes()).unwrap();
        assert_eq!(env.message_type().unwrap(), "subscribe");
    }

    #[test]
    fn click_comparison_is_case_sensitive() {
        let env = Envelope::parse(click_event("CLICK", "MENU1").as_bytes()).unwrap();
        assert_eq!(env.message_type().unwrap(), "CLICK");
    }

    #[test]
    fn event_without_event_tag_is_field_not_found() {
        let xml = "<xml><MsgType>event</MsgType></xml>";
        let env = Envelope::parse(xml.as_bytes()).unwrap();
        assert_eq!(
            env.message_type(),
            Err(EnvelopeError::FieldNotFound("Event".into()))
        );
    }

    #[test]
    fn explicit_message_id_wins() {
        let env = Envelope::parse(TEXT_MESSAGE.as_bytes()).unwrap();
        assert_eq!(env.message_id().unwrap(), "6045765409218158849");
    }

    #[test]
    fn synthesised_message_id_is_stable() {
        let first = Envelope::parse(click_event("click", "MENU1").as_bytes()).unwrap();
        let again = Envelope::parse(click_event("click", "MENU1").as_bytes()).unwrap();
        let id = first.message_id().unwrap();
        assert_eq!(id, "oia2TjuEGTNoeX76QEjQNrcURxG8-MENU1@1407743423");
        assert_eq!(id, again.message_id().unwrap());
    }

    #[test]
    fn tree_keeps_nested_elements() {
        let xml = "<xml><ScanCodeInfo><ScanType>qrcode</ScanType><ScanResult>1</ScanResult></ScanCodeInfo></xml>";
        let env = Envelope::parse(xml.as_bytes()).unwrap();
        let info = env.root().child("ScanCodeInfo").unwrap();
        assert_eq!(info.children().len(), 2);
        assert_eq!(info.child("ScanType").unwrap().text(), "qrcode");
        assert_eq!(env.root().tag(), "xml");
    }

    #[test]
    fn declaration_and_indentation_are_ignored() {
        let xml = "<?xml version=\"1.0\"?>\n<xml>\n  <MsgType>text</MsgType>\n</xml>\n";
        let env = Envelope::parse(xml.as_bytes()).unwrap();
        assert_eq!(env.tag("MsgType").unwrap(), "text");
        assert_eq!(env.as_str(), xml);
    }

    #[test]
    fn field_text_is_not_trimmed() {
        let env =
            Envelope::parse(b"<xml><Content> hi there </Content><A>x <![CDATA[ y ]]></A></xml>")
                .unwrap();
        assert_eq!(env.get_field("content").unwrap(), " hi there ");
        assert_eq!(env.tag("A").unwrap(), "x  y ");
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        for bad in [
            "",
            "not markup",
            "<xml><MsgType>text</xml>",
            "<xml><MsgType>text</MsgType>",
            "<xml></xml><xml></xml>",
        ] {
            assert!(
                matches!(
                    Envelope::parse(bad.as_bytes()),
                    Err(EnvelopeError::MalformedPayload(_))
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn non_utf8_is_malformed() {
        assert!(matches!(
            Envelope::parse(&[0x3c, 0xff, 0xfe, 0x3e]),
            Err(EnvelopeError::MalformedPayload(_))
        ));
    }
}
