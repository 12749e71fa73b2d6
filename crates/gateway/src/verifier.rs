//! Inbound callback verification.
//!
//! A request moves through `Received → Classified → SignatureChecked →
//! {Verified | Rejected}`:
//!
//! 1. **Classify** on method and the presence of `msg_signature`, collecting
//!    the signature inputs and the payload. A missing field rejects here,
//!    before any digest is computed.
//! 2. **Check** the supplied signature against the digest in constant time.
//! 3. **Open** the payload: decrypt on encrypted channels, then parse messages
//!    into an [`Envelope`].
//!
//! | variant   | method   | signature param  | covered inputs                         | result            |
//! |-----------|----------|------------------|----------------------------------------|-------------------|
//! | challenge | GET      | `signature`      | token, timestamp, nonce                | `echostr` verbatim|
//! | encrypted | GET/POST | `msg_signature`  | token, timestamp, nonce, ciphertext    | decrypted payload |
//! | plain     | POST     | `signature`      | token, timestamp, nonce                | body as message   |

use std::sync::Arc;

use bytes::Bytes;
use common::protocol::{
    PARAM_ECHOSTR, PARAM_ENCRYPT_TYPE, PARAM_MSG_SIGNATURE, PARAM_NONCE, PARAM_SIGNATURE,
    PARAM_TIMESTAMP, TAG_ENCRYPT,
};
use common::{HttpMethod, RawRequest, RejectReason};
use tracing::debug;

use crate::credentials::Credentials;
use crate::crypto::{cipher, SignatureInputs};
use crate::message::{Envelope, EnvelopeError, InboundMessage};

/// Handshake variant a request was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Unencrypted GET URL verification.
    Challenge,
    /// Encrypted GET verification or encrypted POST message.
    Encrypted,
    /// Legacy unencrypted POST message.
    Plain,
}

/// What a verified request carries.
#[derive(Debug)]
pub enum Payload {
    /// A challenge to echo back, already decrypted on encrypted channels.
    Challenge(String),
    /// A message to dispatch.
    Message(InboundMessage),
}

/// A request that passed verification.
#[derive(Debug)]
pub struct Verified {
    pub variant: Variant,
    pub payload: Payload,
}

/// Outcome of verifying one request.
#[derive(Debug)]
pub enum Verification {
    Verified(Verified),
    Rejected(RejectReason),
}

/// Payload as extracted from the request, before the signature is checked.
enum Sealed {
    Challenge(String),
    Ciphertext(String),
    Plain(Bytes),
}

struct Classified {
    variant: Variant,
    method: HttpMethod,
    inputs: SignatureInputs,
    supplied: String,
    sealed: Sealed,
}

struct SignatureChecked {
    variant: Variant,
    method: HttpMethod,
    sealed: Sealed,
}

/// Verifies inbound callbacks against one account's credentials.
#[derive(Debug, Clone)]
pub struct Verifier {
    credentials: Arc<Credentials>,
}

impl Verifier {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self { credentials }
    }

    /// Run a request through the state machine.
    pub fn verify(&self, req: &RawRequest) -> Verification {
        match self.run(req) {
            Ok(verified) => Verification::Verified(verified),
            Err(reason) => Verification::Rejected(reason),
        }
    }

    fn run(&self, req: &RawRequest) -> Result<Verified, RejectReason> {
        let classified = classify(self.credentials.token(), req)?;
        debug!(
            variant = ?classified.variant,
            encrypt_type = req.param(PARAM_ENCRYPT_TYPE),
            "callback classified"
        );
        let checked = classified.check_signature()?;
        checked.open(&self.credentials)
    }
}

fn required<'a>(req: &'a RawRequest, name: &'static str) -> Result<&'a str, RejectReason> {
    req.param(name).ok_or(RejectReason::MissingField(name))
}

fn classify(token: &str, req: &RawRequest) -> Result<Classified, RejectReason> {
    let timestamp = required(req, PARAM_TIMESTAMP)?;
    let nonce = required(req, PARAM_NONCE)?;
    let inputs = SignatureInputs::new(token, timestamp, nonce);

    if req.is_encrypted() {
        let supplied = required(req, PARAM_MSG_SIGNATURE)?.to_owned();
        let ciphertext = match req.method {
            HttpMethod::Get => required(req, PARAM_ECHOSTR)?.to_owned(),
            HttpMethod::Post => encrypt_tag(&req.body)?,
        };
        return Ok(Classified {
            variant: Variant::Encrypted,
            method: req.method,
            inputs: inputs.with_ciphertext(&ciphertext),
            supplied,
            sealed: Sealed::Ciphertext(ciphertext),
        });
    }

    let supplied = required(req, PARAM_SIGNATURE)?.to_owned();
    let (variant, sealed) = match req.method {
        HttpMethod::Get => (
            Variant::Challenge,
            Sealed::Challenge(required(req, PARAM_ECHOSTR)?.to_owned()),
        ),
        HttpMethod::Post => (Variant::Plain, Sealed::Plain(req.body.clone())),
    };
    Ok(Classified {
        variant,
        method: req.method,
        inputs,
        supplied,
        sealed,
    })
}

/// The `Encrypt` element of an encrypted POST body. An unparseable body has none.
fn encrypt_tag(body: &[u8]) -> Result<String, RejectReason> {
    Envelope::parse(body)
        .ok()
        .and_then(|outer| outer.tag(TAG_ENCRYPT).ok())
        .ok_or(RejectReason::MissingField(TAG_ENCRYPT))
}

impl Classified {
    fn check_signature(self) -> Result<SignatureChecked, RejectReason> {
        if !self.inputs.verify(&self.supplied) {
            return Err(RejectReason::SignatureMismatch);
        }
        Ok(SignatureChecked {
            variant: self.variant,
            method: self.method,
            sealed: self.sealed,
        })
    }
}

impl SignatureChecked {
    fn open(self, creds: &Credentials) -> Result<Verified, RejectReason> {
        let payload = match self.sealed {
            Sealed::Challenge(echostr) => Payload::Challenge(echostr),
            Sealed::Ciphertext(ciphertext) => {
                let plaintext = cipher::decrypt(creds, &ciphertext)
                    .map_err(|e| RejectReason::Framing(e.to_string()))?;
                match self.method {
                    HttpMethod::Get => Payload::Challenge(
                        String::from_utf8(plaintext)
                            .map_err(|e| RejectReason::MalformedPayload(e.to_string()))?,
                    ),
                    HttpMethod::Post => Payload::Message(InboundMessage {
                        envelope: parse_message(&plaintext)?,
                        encrypted: true,
                    }),
                }
            }
            Sealed::Plain(body) => Payload::Message(InboundMessage {
                envelope: parse_message(&body)?,
                encrypted: false,
            }),
        };
        Ok(Verified {
            variant: self.variant,
            payload,
        })
    }
}

fn parse_message(payload: &[u8]) -> Result<Envelope, RejectReason> {
    Envelope::parse(payload).map_err(|e| match e {
        EnvelopeError::MalformedPayload(reason) => RejectReason::MalformedPayload(reason),
        other => RejectReason::MalformedPayload(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use super::*;
    use crate::crypto::signer::signature;

    const TOKEN: &str = "QDG6eK";
    const TIMESTAMP: &str = "1409659813";
    const NONCE: &str = "1372623149";

    const MESSAGE: &str = "<xml>\
        <ToUserName><![CDATA[wx5823bf96d3bd56c7]]></ToUserName>\
        <FromUserName><![CDATA[mycreate]]></FromUserName>\
        <CreateTime>1409659813</CreateTime>\
        <MsgType><![CDATA[event]]></MsgType>\
        <Event><![CDATA[click]]></Event>\
        <EventKey><![CDATA[MENU1]]></EventKey>\
        </xml>";

    fn creds() -> Arc<Credentials> {
        Arc::new(
            Credentials::from_encoded(
                "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG",
                "wx5823bf96d3bd56c7",
                TOKEN,
            )
            .unwrap(),
        )
    }

    fn verifier() -> Verifier {
        Verifier::new(creds())
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn plain_signature() -> String {
        signature([TOKEN, TIMESTAMP, NONCE])
    }

    fn encrypted_post(ciphertext: &str, msg_signature: &str) -> RawRequest {
        RawRequest::post(
            query(&[
                ("timestamp", TIMESTAMP),
                ("nonce", NONCE),
                ("encrypt_type", "aes"),
                ("msg_signature", msg_signature),
            ]),
            format!("<xml><ToUserName><![CDATA[wx5823bf96d3bd56c7]]></ToUserName><Encrypt><![CDATA[{ciphertext}]]></Encrypt></xml>"),
        )
    }

    fn rejected(v: Verification) -> RejectReason {
        match v {
            Verification::Rejected(reason) => reason,
            Verification::Verified(v) => panic!("unexpectedly verified: {:?}", v.variant),
        }
    }

    fn verified(v: Verification) -> Verified {
        match v {
            Verification::Verified(v) => v,
            Verification::Rejected(reason) => panic!("unexpectedly rejected: {reason}"),
        }
    }

    #[test]
    fn challenge_is_echoed_verbatim() {
        let req = RawRequest::get(query(&[
            ("timestamp", TIMESTAMP),
            ("nonce", NONCE),
            ("signature", plain_signature().as_str()),
            ("echostr", "5837397520665436492"),
        ]));
        let v = verified(verifier().verify(&req));
        assert_eq!(v.variant, Variant::Challenge);
        assert!(matches!(v.payload, Payload::Challenge(ref s) if s == "5837397520665436492"));
    }

    #[test]
    fn challenge_with_bad_signature_is_rejected() {
        let req = RawRequest::get(query(&[
            ("timestamp", TIMESTAMP),
            ("nonce", NONCE),
            ("signature", "0000000000000000000000000000000000000000"),
            ("echostr", "5837397520665436492"),
        ]));
        assert_eq!(rejected(verifier().verify(&req)), RejectReason::SignatureMismatch);
    }

    #[test]
    fn missing_fields_reject_before_signature_check() {
        let cases: [(&[(&str, &str)], &str); 4] = [
            (&[("nonce", NONCE), ("signature", "x"), ("echostr", "e")], "timestamp"),
            (&[("timestamp", TIMESTAMP), ("signature", "x"), ("echostr", "e")], "nonce"),
            (&[("timestamp", TIMESTAMP), ("nonce", NONCE), ("echostr", "e")], "signature"),
            (&[("timestamp", TIMESTAMP), ("nonce", NONCE), ("signature", "x")], "echostr"),
        ];
        for (pairs, field) in cases {
            let req = RawRequest::get(query(pairs));
            assert_eq!(
                rejected(verifier().verify(&req)),
                RejectReason::MissingField(field)
            );
        }
    }

    #[test]
    fn encrypted_get_returns_decrypted_challenge() {
        let c = creds();
        let echostr = cipher::encrypt(&c, b"1616140317555161061").unwrap();
        let sig = signature([TOKEN, TIMESTAMP, NONCE, echostr.as_str()]);
        let req = RawRequest::get(query(&[
            ("timestamp", TIMESTAMP),
            ("nonce", NONCE),
            ("msg_signature", sig.as_str()),
            ("echostr", echostr.as_str()),
        ]));
        let v = verified(Verifier::new(c).verify(&req));
        assert_eq!(v.variant, Variant::Encrypted);
        assert!(matches!(v.payload, Payload::Challenge(ref s) if s == "1616140317555161061"));
    }

    #[test]
    fn encrypted_get_signature_covers_echostr() {
        let c = creds();
        let echostr = cipher::encrypt(&c, b"1616140317555161061").unwrap();
        let req = RawRequest::get(query(&[
            ("timestamp", TIMESTAMP),
            ("nonce", NONCE),
            ("msg_signature", plain_signature().as_str()),
            ("echostr", echostr.as_str()),
        ]));
        assert_eq!(rejected(Verifier::new(c).verify(&req)), RejectReason::SignatureMismatch);
    }

    #[test]
    fn encrypted_post_yields_envelope() {
        let c = creds();
        let ct = cipher::encrypt(&c, MESSAGE.as_bytes()).unwrap();
        let sig = signature([TOKEN, TIMESTAMP, NONCE, ct.as_str()]);
        let v = verified(Verifier::new(c).verify(&encrypted_post(&ct, &sig)));
        assert_eq!(v.variant, Variant::Encrypted);
        match v.payload {
            Payload::Message(msg) => {
                assert!(msg.encrypted);
                assert_eq!(msg.envelope.message_type().unwrap(), "MENU1");
                assert_eq!(msg.envelope.from_user_name().unwrap(), "mycreate");
            }
            Payload::Challenge(_) => panic!("expected a message"),
        }
    }

    #[test]
    fn tampered_ciphertext_is_a_framing_error() {
        let c = creds();
        let ct = cipher::encrypt(&c, MESSAGE.as_bytes()).unwrap();
        let mut raw = STANDARD.decode(&ct).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);
        // The attacker re-signs; only the codec can notice.
        let sig = signature([TOKEN, TIMESTAMP, NONCE, tampered.as_str()]);
        let reason = rejected(Verifier::new(c).verify(&encrypted_post(&tampered, &sig)));
        assert_eq!(reason.code(), "framing_error");
    }

    #[test]
    fn foreign_account_frame_is_a_framing_error() {
        let c = creds();
        let foreign = Credentials::from_encoded(
            "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG",
            "wxforeignaccount00",
            TOKEN,
        )
        .unwrap();
        let ct = cipher::encrypt(&foreign, MESSAGE.as_bytes()).unwrap();
        let sig = signature([TOKEN, TIMESTAMP, NONCE, ct.as_str()]);
        let reason = rejected(Verifier::new(c).verify(&encrypted_post(&ct, &sig)));
        assert_eq!(reason, RejectReason::Framing("account id mismatch".into()));
    }

    #[test]
    fn encrypted_mode_is_decided_by_msg_signature() {
        // A valid legacy signature does not help once msg_signature is present.
        let req = RawRequest::post(
            query(&[
                ("timestamp", TIMESTAMP),
                ("nonce", NONCE),
                ("signature", plain_signature().as_str()),
                ("msg_signature", "bogus"),
            ]),
            MESSAGE,
        );
        assert_eq!(
            rejected(verifier().verify(&req)),
            RejectReason::MissingField("Encrypt")
        );
    }

    #[test]
    fn encrypted_post_without_encrypt_tag_is_missing_field() {
        let req = encrypted_post("", "sig");
        let req = RawRequest::post(req.query, "<xml><ToUserName>x</ToUserName></xml>");
        assert_eq!(
            rejected(verifier().verify(&req)),
            RejectReason::MissingField("Encrypt")
        );
    }

    #[test]
    fn plain_post_yields_envelope() {
        let req = RawRequest::post(
            query(&[
                ("timestamp", TIMESTAMP),
                ("nonce", NONCE),
                ("signature", plain_signature().as_str()),
            ]),
            MESSAGE,
        );
        let v = verified(verifier().verify(&req));
        assert_eq!(v.variant, Variant::Plain);
        match v.payload {
            Payload::Message(msg) => {
                assert!(!msg.encrypted);
                assert_eq!(
                    msg.envelope.message_id().unwrap(),
                    "mycreate-MENU1@1409659813"
                );
            }
            Payload::Challenge(_) => panic!("expected a message"),
        }
    }

    #[test]
    fn plain_post_with_garbage_body_is_malformed() {
        let req = RawRequest::post(
            query(&[
                ("timestamp", TIMESTAMP),
                ("nonce", NONCE),
                ("signature", plain_signature().as_str()),
            ]),
            "definitely not markup",
        );
        assert_eq!(rejected(verifier().verify(&req)).code(), "malformed_payload");
    }

    #[test]
    fn encrypted_non_markup_is_malformed_not_framing() {
        let c = creds();
        let ct = cipher::encrypt(&c, b"plain words").unwrap();
        let sig = signature([TOKEN, TIMESTAMP, NONCE, ct.as_str()]);
        let reason = rejected(Verifier::new(c).verify(&encrypted_post(&ct, &sig)));
        assert_eq!(reason.code(), "malformed_payload");
    }
}
