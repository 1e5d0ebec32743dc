use std::borrow::Cow;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::broker::DeliveredMessage;

const ENQUEUED_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub(crate) fn separator() -> String {
    "=".repeat(80)
}

fn rule() -> String {
    "-".repeat(40)
}

/// Pretty-print a JSON body with two-space indentation and the original
/// key order. Anything that does not parse is returned untouched.
pub fn format_body(body: &[u8]) -> Cow<'_, [u8]> {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return Cow::Borrowed(body);
    };
    match serde_json::to_vec_pretty(&value) {
        Ok(pretty) => Cow::Owned(pretty),
        Err(_) => Cow::Borrowed(body),
    }
}

pub fn format_enqueued(at: &DateTime<Utc>) -> String {
    at.format(ENQUEUED_FORMAT).to_string()
}

/// The full console block shown for one delivery.
pub fn render(message: &DeliveredMessage) -> Vec<u8> {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&separator());
    out.push_str("\nNEW MESSAGE RECEIVED\n");
    out.push_str(&separator());
    out.push('\n');
    out.push_str(&format!("Message ID: {}\n", message.id));
    out.push_str(&format!(
        "Enqueued Time: {}\n",
        format_enqueued(&message.enqueued_at)
    ));
    out.push_str(&format!("Delivery Count: {}\n", message.delivery_count));
    out.push_str(&format!(
        "Content Type: {}\n",
        message.content_type.as_deref().unwrap_or("(none)")
    ));

    if message.properties.is_empty() {
        out.push_str("Properties: (none)\n");
    } else {
        out.push_str("Properties:\n");
        for (key, value) in &message.properties {
            out.push_str(&format!("    {key}: {value}\n"));
        }
    }

    out.push_str("\nMessage Content:\n");
    out.push_str(&rule());
    out.push('\n');

    let mut bytes = out.into_bytes();
    let body = format_body(&message.body);
    bytes.extend_from_slice(&body);
    if !body.ends_with(b"\n") {
        bytes.push(b'\n');
    }
    // Writing into a Vec cannot fail.
    let _ = writeln!(bytes, "{}", rule());
    bytes
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use lockstep_sdk::PropertyValue;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    use super::*;

    fn message(body: &[u8]) -> DeliveredMessage {
        let enqueued = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        DeliveredMessage {
            id: "m1".to_string(),
            lock_token: "token".to_string(),
            body: body.to_vec(),
            properties: vec![
                ("Source".to_string(), PropertyValue::from("timer")),
                ("Priority".to_string(), PropertyValue::Int(2)),
            ],
            content_type: Some("application/json".to_string()),
            delivery_count: 3,
            enqueued_at: enqueued,
            locked_until: enqueued,
        }
    }

    #[test]
    fn json_is_indented_with_keys_in_order() {
        let body = br#"{"zeta":1,"alpha":{"b":true,"a":null},"list":[1,2]}"#;
        let pretty = String::from_utf8(format_body(body).into_owned()).unwrap();
        assert_eq!(
            pretty,
            "{\n  \"zeta\": 1,\n  \"alpha\": {\n    \"b\": true,\n    \"a\": null\n  },\n  \"list\": [\n    1,\n    2\n  ]\n}"
        );
    }

    #[test]
    fn malformed_json_is_shown_verbatim() {
        let body = b"{\"content\": \"cut off";
        assert_eq!(format_body(body).as_ref(), body);

        let binary = [0xff, 0x00, 0xfe, b'{'];
        assert_eq!(format_body(&binary).as_ref(), binary);
    }

    #[test]
    fn block_shows_message_fields_in_order() {
        let rendered = String::from_utf8(render(&message(br#"{"content":"hello"}"#))).unwrap();

        let expected_lines = [
            "Message ID: m1",
            "Enqueued Time: 2024-03-01 12:30:05 UTC",
            "Delivery Count: 3",
            "Content Type: application/json",
            "Properties:",
            "    Source: timer",
            "    Priority: 2",
            "Message Content:",
            "{",
            "  \"content\": \"hello\"",
            "}",
        ];
        let mut rest = rendered.as_str();
        for line in expected_lines {
            let at = rest
                .find(line)
                .unwrap_or_else(|| panic!("missing {line:?} in:\n{rendered}"));
            rest = &rest[at + line.len()..];
        }
        assert!(rendered.ends_with(&format!("{}\n", "-".repeat(40))));
    }

    #[test]
    fn missing_content_type_and_properties_are_marked() {
        let mut msg = message(b"plain text");
        msg.content_type = None;
        msg.properties.clear();
        let rendered = String::from_utf8(render(&msg)).unwrap();
        assert!(rendered.contains("Content Type: (none)\n"));
        assert!(rendered.contains("Properties: (none)\n"));
        assert!(rendered.contains("\nplain text\n"));
    }

    #[test]
    fn non_utf8_body_bytes_reach_the_console_unchanged() {
        let body = [b'a', 0xc3, 0x28, b'z'];
        let rendered = render(&message(&body));
        assert!(rendered.windows(body.len()).any(|w| w == body));
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "\\PC{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[a-zA-Z_]{1,8}", inner), 0..6)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    proptest! {
        #[test]
        fn pretty_output_reparses_to_the_same_value(value in json_value()) {
            let compact = serde_json::to_vec(&value).unwrap();
            let pretty = format_body(&compact);
            let reparsed: Value = serde_json::from_slice(&pretty).unwrap();
            prop_assert_eq!(reparsed, value);
        }

        #[test]
        fn unparseable_bodies_pass_through(body in prop::collection::vec(any::<u8>(), 0..64)) {
            if serde_json::from_slice::<Value>(&body).is_err() {
                let formatted = format_body(&body);
                prop_assert_eq!(formatted.as_ref(), body.as_slice());
            }
        }
    }

    #[test]
    fn scalar_json_bodies_are_still_json() {
        assert_eq!(format_body(b" 42 ").as_ref(), b"42");
        assert_eq!(
            serde_json::from_slice::<Value>(&format_body(br#"["a"]"#)).unwrap(),
            json!(["a"])
        );
    }
}
