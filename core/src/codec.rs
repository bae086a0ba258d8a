//! Wire codec: inbound frame classification and outbound command text

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::config::PushRegistration;

static OPERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^a\["\{"op":"(?P<op>[^"]+)",(?P<args>.*)\}"\]$"#).expect("operation pattern")
});

static CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^c\[?(?P<code>[^"]+),?"?(?P<message>.*)"?\]?$"#).expect("close pattern")
});

static VALIDATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^("up":){1}(?P<up>.*)?,"set":(?P<set>.*)$"#).expect("validated pattern")
});

static CHANNEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"ch":"(?P<channel>.*)"$"#).expect("channel pattern"));

static EXCEPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^"ex":\{("op":"(?P<op>[^"]+)",)?("ch":"(?P<channel>.*)",)?"ex":"(?P<error>.*)"\}$"#,
    )
    .expect("exception pattern")
});

static RECEIVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^a\["\{"ch":"(?P<channel>.*)","m":"(?P<message>[\s\S]*)"\}"\]$"#)
        .expect("received pattern")
});

static MULTIPART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<id>.[^_]*)_(?P<part>.[^-]*)-(?P<total>.[^_]*)_(?P<message>[\s\S]*)$")
        .expect("multipart pattern")
});

static PERMISSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?P<key>[^"]+)":{1}"(?P<value>[^,"]+)",?"#).expect("permissions pattern")
});

/// Keep-alive frame sent while heartbeats are active
pub const KEEP_ALIVE: &str = "b";

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `o`: the server echoed the socket open
    Open,
    /// `h`: server heartbeat
    Heartbeat,
    /// Handshake accepted, with the granted (channel pattern, hash) pairs
    Validated {
        permissions: Vec<(String, String)>,
        busy: bool,
    },
    Subscribed(String),
    Unsubscribed(String),
    /// Server-declared error, optionally tied to an operation and a channel
    Error {
        op: Option<String>,
        channel: Option<String>,
        text: String,
    },
    /// Channel payload, already unescaped
    Received { channel: String, message: String },
    Close { code: String, message: String },
    /// Operation envelope with an operation name this client does not know
    UnknownOperation { op: String },
    /// Known operation whose arguments did not parse
    Malformed { op: String },
    Unrecognized,
}

impl Frame {
    /// Classify a raw inbound text frame
    pub fn parse(raw: &str) -> Frame {
        match raw {
            "o" => return Frame::Open,
            "h" => return Frame::Heartbeat,
            _ => {}
        }

        let text = raw.replace("\\\"", "\"");

        if let Some(caps) = OPERATION.captures(&text) {
            let op = &caps["op"];
            let args = &caps["args"];
            return parse_operation(op, args);
        }

        if let Some(caps) = CLOSE.captures(&text) {
            return Frame::Close {
                code: caps["code"].trim_end_matches(',').to_string(),
                message: caps["message"]
                    .trim_end_matches(']')
                    .trim_end_matches('"')
                    .to_string(),
            };
        }

        if let Some(caps) = RECEIVED.captures(&text) {
            return Frame::Received {
                channel: caps["channel"].to_string(),
                message: unescape_payload(&caps["message"]),
            };
        }

        Frame::Unrecognized
    }

    /// Whether the raw frame starts with the close marker
    pub fn is_close_marker(raw: &str) -> bool {
        raw.starts_with('c')
    }
}

fn parse_operation(op: &str, args: &str) -> Frame {
    let malformed = || Frame::Malformed { op: op.to_string() };

    match op {
        "ortc-validated" => match VALIDATED.captures(args) {
            Some(caps) => Frame::Validated {
                permissions: caps
                    .name("up")
                    .map(|m| parse_permissions(m.as_str()))
                    .unwrap_or_default(),
                busy: args.contains("busy"),
            },
            None => malformed(),
        },
        "ortc-subscribed" => match CHANNEL.captures(args) {
            Some(caps) => Frame::Subscribed(caps["channel"].to_string()),
            None => malformed(),
        },
        "ortc-unsubscribed" => match CHANNEL.captures(args) {
            Some(caps) => Frame::Unsubscribed(caps["channel"].to_string()),
            None => malformed(),
        },
        "ortc-error" => match EXCEPTION.captures(args) {
            Some(caps) => Frame::Error {
                op: caps.name("op").map(|m| m.as_str().to_string()),
                channel: caps.name("channel").map(|m| m.as_str().to_string()),
                text: caps["error"].to_string(),
            },
            None => malformed(),
        },
        other => Frame::UnknownOperation {
            op: other.to_string(),
        },
    }
}

/// Parse the permission block of a handshake response
pub fn parse_permissions(block: &str) -> Vec<(String, String)> {
    if block.is_empty() || block == "null" {
        return Vec::new();
    }

    PERMISSIONS
        .captures_iter(block)
        .map(|caps| (caps["key"].to_string(), caps["value"].to_string()))
        .collect()
}

/// Undo the escaping applied to channel payloads
pub fn unescape_payload(message: &str) -> String {
    message
        .replace(r"\\n", "\n")
        .replace(r#"\\""#, "\"")
        .replace(r"\\\\", "\\")
}

/// One fragment of a chunked message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    pub id: String,
    pub part: u32,
    pub total: u32,
    pub payload: String,
}

/// Match the `<id>_<part>-<total>_<payload>` envelope.
///
/// A payload whose part numbers do not parse is treated as a whole message.
pub fn parse_multipart(message: &str) -> Option<Multipart> {
    let caps = MULTIPART.captures(message)?;
    let part = caps["part"].parse().ok()?;
    let total = caps["total"].parse().ok()?;

    Some(Multipart {
        id: caps["id"].to_string(),
        part,
        total,
        payload: caps["message"].to_string(),
    })
}

/// Split `message` into pieces of at most `bound` bytes without breaking
/// UTF-8 characters. An empty message yields a single empty piece.
pub fn split_message(message: &str, bound: usize) -> Vec<String> {
    if message.is_empty() {
        return vec![String::new()];
    }

    let mut parts = Vec::with_capacity(message.len() / bound.max(1) + 1);
    let mut rest = message;

    while !rest.is_empty() {
        let mut end = bound.min(rest.len());
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // bound smaller than the next character
            end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }

        let (head, tail) = rest.split_at(end);
        parts.push(head.to_string());
        rest = tail;
    }

    parts
}

/// Random alphanumeric identifier of `len` characters (at most 32)
pub fn generate_id(len: usize) -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(len);
    id
}

/// Outbound protocol command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Validate {
        app_key: &'a str,
        auth_token: &'a str,
        announcement_subchannel: &'a str,
        session_id: &'a str,
        metadata: &'a str,
        /// Keep-alive interval and tolerated failures, when heartbeats are active
        heartbeat: Option<(u64, u32)>,
    },
    Subscribe {
        app_key: &'a str,
        auth_token: &'a str,
        channel: &'a str,
        hash: &'a str,
        notification: Option<&'a PushRegistration>,
    },
    Unsubscribe {
        app_key: &'a str,
        channel: &'a str,
        notification: Option<&'a PushRegistration>,
    },
    Send {
        app_key: &'a str,
        auth_token: &'a str,
        channel: &'a str,
        hash: &'a str,
        message_id: &'a str,
        part: usize,
        total: usize,
        payload: &'a str,
    },
    SendProxy {
        app_key: &'a str,
        private_key: &'a str,
        channel: &'a str,
        message_id: &'a str,
        part: usize,
        total: usize,
        payload: &'a str,
    },
    KeepAlive,
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Validate {
                app_key,
                auth_token,
                announcement_subchannel,
                session_id,
                metadata,
                heartbeat,
            } => {
                write!(
                    f,
                    "validate;{};{};{};{};{}",
                    app_key, auth_token, announcement_subchannel, session_id, metadata
                )?;
                if let Some((time, fails)) = heartbeat {
                    write!(f, ";{};{}", time, fails)?;
                }
                Ok(())
            }
            Command::Subscribe {
                app_key,
                auth_token,
                channel,
                hash,
                notification,
            } => {
                write!(f, "subscribe;{};{};{};{}", app_key, auth_token, channel, hash)?;
                if let Some(registration) = notification {
                    write!(f, ";{};{}", registration.token(), registration.tag())?;
                }
                Ok(())
            }
            Command::Unsubscribe {
                app_key,
                channel,
                notification,
            } => {
                write!(f, "unsubscribe;{};{}", app_key, channel)?;
                // only GCM registrations are released on unsubscribe
                if let Some(PushRegistration::Gcm { registration_id }) = notification {
                    write!(f, ";{};GCM", registration_id)?;
                }
                Ok(())
            }
            Command::Send {
                app_key,
                auth_token,
                channel,
                hash,
                message_id,
                part,
                total,
                payload,
            } => write!(
                f,
                "send;{};{};{};{};{}_{}-{}_{}",
                app_key, auth_token, channel, hash, message_id, part, total, payload
            ),
            Command::SendProxy {
                app_key,
                private_key,
                channel,
                message_id,
                part,
                total,
                payload,
            } => write!(
                f,
                "sendproxy;{};{};{};{}_{}-{}_{}",
                app_key, private_key, channel, message_id, part, total, payload
            ),
            Command::KeepAlive => f.write_str(KEEP_ALIVE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_character_frames() {
        assert_eq!(Frame::parse("o"), Frame::Open);
        assert_eq!(Frame::parse("h"), Frame::Heartbeat);
        assert!(Frame::is_close_marker("c[1000,\"Go away\"]"));
        assert!(!Frame::is_close_marker("h"));
    }

    #[test]
    fn test_parse_validated_with_permissions() {
        let raw = r#"a["{\"op\":\"ortc-validated\",\"up\":{\"chat\":\"H1\",\"news:*\":\"H2\"},\"set\":1800}"]"#;

        assert_eq!(
            Frame::parse(raw),
            Frame::Validated {
                permissions: vec![
                    ("chat".to_string(), "H1".to_string()),
                    ("news:*".to_string(), "H2".to_string()),
                ],
                busy: false,
            }
        );
    }

    #[test]
    fn test_parse_validated_without_permissions() {
        let raw = r#"a["{\"op\":\"ortc-validated\",\"up\":null,\"set\":1800}"]"#;
        assert_eq!(
            Frame::parse(raw),
            Frame::Validated {
                permissions: vec![],
                busy: false,
            }
        );

        let busy = r#"a["{\"op\":\"ortc-validated\",\"up\":null,\"set\":1800,\"busy\":true}"]"#;
        assert!(matches!(Frame::parse(busy), Frame::Validated { busy: true, .. }));
    }

    #[test]
    fn test_parse_subscription_operations() {
        assert_eq!(
            Frame::parse(r#"a["{\"op\":\"ortc-subscribed\",\"ch\":\"chat\"}"]"#),
            Frame::Subscribed("chat".to_string())
        );
        assert_eq!(
            Frame::parse(r#"a["{\"op\":\"ortc-unsubscribed\",\"ch\":\"news:sports\"}"]"#),
            Frame::Unsubscribed("news:sports".to_string())
        );
    }

    #[test]
    fn test_parse_error_operation() {
        let raw = r#"a["{\"op\":\"ortc-error\",\"ex\":{\"op\":\"subscribe\",\"ch\":\"chat\",\"ex\":\"Access denied\"}}"]"#;
        assert_eq!(
            Frame::parse(raw),
            Frame::Error {
                op: Some("subscribe".to_string()),
                channel: Some("chat".to_string()),
                text: "Access denied".to_string(),
            }
        );

        let bare = r#"a["{\"op\":\"ortc-error\",\"ex\":{\"ex\":\"Something failed\"}}"]"#;
        assert_eq!(
            Frame::parse(bare),
            Frame::Error {
                op: None,
                channel: None,
                text: "Something failed".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_unknown_and_malformed_operations() {
        assert_eq!(
            Frame::parse(r#"a["{\"op\":\"ortc-mystery\",\"x\":1}"]"#),
            Frame::UnknownOperation {
                op: "ortc-mystery".to_string()
            }
        );
        assert_eq!(
            Frame::parse(r#"a["{\"op\":\"ortc-subscribed\",\"channel\":1}"]"#),
            Frame::Malformed {
                op: "ortc-subscribed".to_string()
            }
        );
        assert_eq!(Frame::parse("garbage"), Frame::Unrecognized);
    }

    #[test]
    fn test_parse_received_unescapes_payload() {
        let raw = r#"a["{\"ch\":\"chat\",\"m\":\"line1\\nline2\"}"]"#;
        assert_eq!(
            Frame::parse(raw),
            Frame::Received {
                channel: "chat".to_string(),
                message: "line1\nline2".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_close() {
        assert_eq!(
            Frame::parse(r#"c[1000,"Normal closure"]"#),
            Frame::Close {
                code: "1000".to_string(),
                message: "Normal closure".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_multipart_envelope() {
        assert_eq!(
            parse_multipart("ab12cd34_2-3_hello_world"),
            Some(Multipart {
                id: "ab12cd34".to_string(),
                part: 2,
                total: 3,
                payload: "hello_world".to_string(),
            })
        );
        assert_eq!(parse_multipart("plain message"), None);
        assert_eq!(parse_multipart("id_x-y_payload"), None);
    }

    #[test]
    fn test_split_2000_bytes_into_four_parts() {
        let message = "x".repeat(2000);
        let parts = split_message(&message, 650);

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].len(), 650);
        assert_eq!(parts[3].len(), 50);
        assert_eq!(parts.concat(), message);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let message = "ééé";
        let parts = split_message(message, 3);

        assert_eq!(parts, vec!["é", "é", "é"]);
        assert!(parts.iter().all(|p| p.len() <= 3));
        assert_eq!(split_message("", 10), vec![String::new()]);
    }

    #[test]
    fn test_generate_id_length() {
        let id = generate_id(8);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_id(16), generate_id(16));
    }

    #[test]
    fn test_command_wire_text() {
        let validate = Command::Validate {
            app_key: "app",
            auth_token: "token",
            announcement_subchannel: "",
            session_id: "sid",
            metadata: "meta",
            heartbeat: None,
        };
        assert_eq!(validate.to_string(), "validate;app;token;;sid;meta");

        let with_heartbeat = Command::Validate {
            app_key: "app",
            auth_token: "token",
            announcement_subchannel: "",
            session_id: "sid",
            metadata: "meta",
            heartbeat: Some((15, 3)),
        };
        assert_eq!(with_heartbeat.to_string(), "validate;app;token;;sid;meta;15;3");

        let gcm = PushRegistration::Gcm {
            registration_id: "reg".to_string(),
        };
        let apns = PushRegistration::Apns {
            device_token: "dev".to_string(),
        };

        let subscribe = Command::Subscribe {
            app_key: "app",
            auth_token: "token",
            channel: "chat",
            hash: "H1",
            notification: Some(&apns),
        };
        assert_eq!(subscribe.to_string(), "subscribe;app;token;chat;H1;dev;Apns");

        let unsubscribe_gcm = Command::Unsubscribe {
            app_key: "app",
            channel: "chat",
            notification: Some(&gcm),
        };
        assert_eq!(unsubscribe_gcm.to_string(), "unsubscribe;app;chat;reg;GCM");

        let unsubscribe_apns = Command::Unsubscribe {
            app_key: "app",
            channel: "chat",
            notification: Some(&apns),
        };
        assert_eq!(unsubscribe_apns.to_string(), "unsubscribe;app;chat");

        let send = Command::Send {
            app_key: "app",
            auth_token: "token",
            channel: "chat",
            hash: "",
            message_id: "abcd1234",
            part: 1,
            total: 2,
            payload: "hi",
        };
        assert_eq!(send.to_string(), "send;app;token;chat;;abcd1234_1-2_hi");

        let proxy = Command::SendProxy {
            app_key: "app",
            private_key: "secret",
            channel: "chat",
            message_id: "abcd1234",
            part: 1,
            total: 1,
            payload: "hi",
        };
        assert_eq!(proxy.to_string(), "sendproxy;app;secret;chat;abcd1234_1-1_hi");
        assert_eq!(Command::KeepAlive.to_string(), "b");
    }
}
