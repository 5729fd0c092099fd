//! Canonical encoding of envelopes.
//!
//! `encode` is the only producer of the bytes a signature covers; `decode` is
//! its strict inverse and runs only on bytes whose signature has already been
//! checked.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{finite, Envelope, MessageNonce};
use crate::error::{Error, Result};

/// Borrowed view used for encoding, so payloads are never cloned
#[derive(Serialize)]
struct CanonicalEnvelope<'a, T> {
    ts: String,
    nonce: &'a MessageNonce,
    payload: &'a T,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DecodedEnvelope<T> {
    ts: String,
    nonce: MessageNonce,
    payload: T,
}

/// Canonical timestamp form: RFC 3339, UTC designator `Z`, shortest exact
/// fraction (0, 3, 6 or 9 digits)
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DecodingFailed(format!("Invalid timestamp '{}': {}", ts, e)))
}

/// Encode `(timestamp, nonce, payload)` into canonical bytes
///
/// Encoding the same triple twice yields identical bytes. Payloads holding
/// NaN or infinite floats fail with `EncodingFailed`.
pub fn encode<T: Serialize>(
    timestamp: &DateTime<Utc>,
    nonce: &MessageNonce,
    payload: &T,
) -> Result<Vec<u8>> {
    finite::check(payload).map_err(|e| Error::EncodingFailed(e.to_string()))?;

    let canonical = CanonicalEnvelope {
        ts: format_timestamp(timestamp),
        nonce,
        payload,
    };

    serde_json::to_vec(&canonical).map_err(|e| Error::EncodingFailed(e.to_string()))
}

/// Decode canonical bytes back into an envelope
///
/// Fails on malformed JSON, unknown or missing fields, a malformed nonce or
/// timestamp, and payloads that do not match `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<Envelope<T>> {
    let decoded: DecodedEnvelope<T> =
        serde_json::from_slice(bytes).map_err(|e| Error::DecodingFailed(e.to_string()))?;

    Ok(Envelope {
        timestamp: parse_timestamp(&decoded.ts)?,
        nonce: decoded.nonce,
        payload: decoded.payload,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Chat {
        from: String,
        msg: String,
    }

    fn fixed_timestamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap()
    }

    fn fixed_nonce() -> MessageNonce {
        MessageNonce::from_bytes([0xab; 16])
    }

    #[test]
    fn test_canonical_layout() {
        let payload = Chat {
            from: "Alice".into(),
            msg: "Hello Bob".into(),
        };

        let bytes = encode(&fixed_timestamp(), &fixed_nonce(), &payload).unwrap();

        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"ts":"2023-11-14T22:13:20.123456789Z","nonce":"abababababababababababababababab","payload":{"from":"Alice","msg":"Hello Bob"}}"#
        );
    }

    #[test]
    fn test_encode_is_stable() {
        let payload = Chat {
            from: "Alice".into(),
            msg: "Hello Bob".into(),
        };

        let first = encode(&fixed_timestamp(), &fixed_nonce(), &payload).unwrap();
        let second = encode(&fixed_timestamp(), &fixed_nonce(), &payload.clone()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_recovers_triple() {
        let payload = Chat {
            from: "Bob".into(),
            msg: "Hello Alice".into(),
        };

        let bytes = encode(&fixed_timestamp(), &fixed_nonce(), &payload).unwrap();
        let envelope: Envelope<Chat> = decode(&bytes).unwrap();

        assert_eq!(envelope.timestamp, fixed_timestamp());
        assert_eq!(envelope.nonce, fixed_nonce());
        assert_eq!(envelope.payload, payload);
    }

    #[test]
    fn test_whole_second_timestamp_has_no_fraction() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let bytes = encode(&ts, &fixed_nonce(), &()).unwrap();

        assert!(String::from_utf8(bytes)
            .unwrap()
            .contains(r#""ts":"2023-11-14T22:13:20Z""#));
    }

    #[test]
    fn test_non_string_map_keys_fail_to_encode() {
        let mut payload = BTreeMap::new();
        payload.insert((1u32, 2u32), "tuple keys are not JSON".to_string());

        let result = encode(&fixed_timestamp(), &fixed_nonce(), &payload);
        assert!(matches!(result, Err(Error::EncodingFailed(_))));
    }

    #[test]
    fn test_failing_serializer_fails_to_encode() {
        struct Unrepresentable;

        impl Serialize for Unrepresentable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("cannot be represented"))
            }
        }

        let result = encode(&fixed_timestamp(), &fixed_nonce(), &Unrepresentable);
        assert!(matches!(result, Err(Error::EncodingFailed(_))));
    }

    #[test]
    fn test_non_finite_numbers_fail_to_encode() {
        #[derive(Serialize)]
        struct Reading {
            value: f64,
        }

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = encode(&fixed_timestamp(), &fixed_nonce(), &Reading { value });
            assert!(matches!(result, Err(Error::EncodingFailed(_))), "{} encoded", value);
        }

        let result = encode(&fixed_timestamp(), &fixed_nonce(), &vec![1.0f32, f32::NAN]);
        assert!(matches!(result, Err(Error::EncodingFailed(_))));

        assert!(encode(&fixed_timestamp(), &fixed_nonce(), &Reading { value: 21.5 }).is_ok());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode::<Chat>(b"\x00\x01 not json");
        assert!(matches!(result, Err(Error::DecodingFailed(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_payload_shape() {
        let bytes = encode(&fixed_timestamp(), &fixed_nonce(), &42u64).unwrap();
        let result = decode::<Chat>(&bytes);
        assert!(matches!(result, Err(Error::DecodingFailed(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let bytes = br#"{"ts":"2023-11-14T22:13:20Z","nonce":"abababababababababababababababab","payload":1,"extra":true}"#;
        let result = decode::<u32>(bytes);
        assert!(matches!(result, Err(Error::DecodingFailed(_))));
    }

    #[test]
    fn test_decode_rejects_missing_nonce() {
        let bytes = br#"{"ts":"2023-11-14T22:13:20Z","payload":1}"#;
        let result = decode::<u32>(bytes);
        assert!(matches!(result, Err(Error::DecodingFailed(_))));
    }

    #[test]
    fn test_decode_rejects_short_nonce() {
        let bytes = br#"{"ts":"2023-11-14T22:13:20Z","nonce":"abab","payload":1}"#;
        let result = decode::<u32>(bytes);
        assert!(matches!(result, Err(Error::DecodingFailed(_))));
    }

    #[test]
    fn test_decode_rejects_bad_timestamp() {
        let bytes = br#"{"ts":"yesterday","nonce":"abababababababababababababababab","payload":1}"#;
        let result = decode::<u32>(bytes);
        assert!(matches!(result, Err(Error::DecodingFailed(_))));
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            secs in 0i64..4_102_444_800,
            nanos in 0u32..1_000_000_000,
            nonce in any::<[u8; 16]>(),
            from in ".*",
            msg in ".*",
        ) {
            let ts = DateTime::from_timestamp(secs, nanos).unwrap();
            let nonce = MessageNonce::from_bytes(nonce);
            let payload = Chat { from, msg };

            let bytes = encode(&ts, &nonce, &payload).unwrap();
            prop_assert_eq!(&bytes, &encode(&ts, &nonce, &payload).unwrap());

            let envelope: Envelope<Chat> = decode(&bytes).unwrap();
            prop_assert_eq!(envelope.timestamp, ts);
            prop_assert_eq!(envelope.nonce, nonce);
            prop_assert_eq!(envelope.payload, payload);
        }
    }
}
