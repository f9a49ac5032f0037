//! NDJSON framing for control messages

use drover_api::ControlMessage;
use std::io::Write;

use crate::{IpcError, IpcResult};

/// Encode a message as a single line, including the trailing newline
pub fn encode_line(message: &ControlMessage) -> IpcResult<String> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    Ok(json)
}

/// Decode one line. Blank lines decode to `None`.
pub fn decode_line(line: &str) -> IpcResult<Option<ControlMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| IpcError::InvalidMessage(format!("{}: {}", e, line)))
}

/// Write one message to a blocking writer and flush it
pub fn write_message<W: Write>(writer: &mut W, message: &ControlMessage) -> IpcResult<()> {
    let line = encode_line(message)?;
    match writer.write_all(line.as_bytes()).and_then(|_| writer.flush()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(IpcError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_api::ShutdownSignal;

    #[test]
    fn encoded_line_is_newline_terminated() {
        let line = encode_line(&ControlMessage::shutdown(ShutdownSignal::Interrupt)).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn decode_skips_blank_lines() {
        assert!(decode_line("   \n").unwrap().is_none());
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_line(r#"{"_dest":"shutdown","event":"SIGINT"}"#).unwrap_err();
        assert!(matches!(err, IpcError::InvalidMessage(_)));
    }

    #[test]
    fn write_message_to_buffer() {
        let mut buf = Vec::new();
        write_message(&mut buf, &ControlMessage::shutdown(ShutdownSignal::Terminate)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "{\"destination\":\"shutdown\",\"event\":\"terminate\"}\n");
    }
}
