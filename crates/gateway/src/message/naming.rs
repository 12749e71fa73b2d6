//! Logical field names to markup tag names.
//!
//! `from_user_name` → `FromUserName`: split on `_`, title-case each segment,
//! join without separators. Title-casing uppercases a letter that follows a
//! non-letter (or starts the segment) and lowercases every other letter, so
//! acronym tags such as `AgentID` are only reachable as `agent_i_d`, and tags
//! with a literal underscore (`Location_X`) are not reachable at all; use
//! [`super::Envelope::tag`] for those.

/// Map a snake-case logical name to its tag name.
pub fn to_tag_name(logical: &str) -> String {
    logical.split('_').map(title_case).collect()
}

fn title_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut prev_cased = false;
    for c in segment.chars() {
        if c.is_alphabetic() {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_cased = true;
        } else {
            out.push(c);
            prev_cased = false;
        }
    }
    out
}
