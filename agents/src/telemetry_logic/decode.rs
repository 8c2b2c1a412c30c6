//! Wire decode for the upstream telemetry feed. The transport hands frames
//! over undecoded; this layer owns the JSON framing: either a single
//! reading object or an array of readings per frame.

use lib_telemetry::transport::InboundFrame;
use lib_telemetry::Reading;

/// Decodes one frame into one or more readings. The decode error is the
/// caller's to count; the frame is rejected as a whole.
pub fn decode_frame(frame: &InboundFrame) -> Result<Vec<Reading>, serde_json::Error> {
    let text: std::borrow::Cow<'_, str> = match frame {
        InboundFrame::Text(text) => text.as_str().into(),
        InboundFrame::Binary(bytes) => String::from_utf8_lossy(bytes),
    };

    let value: serde_json::Value = serde_json::from_str(&text)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Reading>, _>>(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_object_frame() {
        let frame = InboundFrame::Text(
            r#"{"sourceId":"t1","timestampMs":1000,"value":1.5,"unit":"C","quality":90}"#.to_string(),
        );
        let readings = decode_frame(&frame).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].source_id, "t1");
    }

    #[test]
    fn decodes_batch_frame() {
        let frame = InboundFrame::Text(
            r#"[{"sourceId":"a","timestampMs":1,"value":1.0,"unit":"C","quality":100},
                {"sourceId":"b","timestampMs":2,"value":2.0,"unit":"C","quality":100}]"#
                .to_string(),
        );
        let readings = decode_frame(&frame).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1].source_id, "b");
    }

    #[test]
    fn binary_frames_decode_as_utf8_json() {
        let frame = InboundFrame::Binary(
            br#"{"sourceId":"bin","timestampMs":3,"value":3.0,"unit":"V","quality":80}"#.to_vec(),
        );
        let readings = decode_frame(&frame).unwrap();
        assert_eq!(readings[0].source_id, "bin");
    }

    #[test]
    fn garbage_frame_is_an_error() {
        let frame = InboundFrame::Text("not json".to_string());
        assert!(decode_frame(&frame).is_err());
    }
}
