//! Chunk-boundary tests for the stdio line buffer.

use proptest::prelude::*;
use warden::mcp::framing::LineBuffer;

fn message() -> impl Strategy<Value = String> {
    (1u64..1000, "[a-zé ]{0,20}")
        .prop_map(|(id, text)| format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{"t":"{text}"}}}}"#))
}

proptest! {
    #[test]
    fn any_chunking_yields_the_same_lines(
        messages in prop::collection::vec(message(), 1..8),
        cuts in prop::collection::vec(1usize..16, 0..32),
    ) {
        let stream: Vec<u8> = messages
            .iter()
            .flat_map(|m| format!("{m}\n").into_bytes())
            .collect();

        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        let mut offset = 0;
        for cut in cuts {
            if offset >= stream.len() {
                break;
            }
            let end = (offset + cut).min(stream.len());
            lines.extend(buffer.push(&stream[offset..end]));
            offset = end;
        }
        lines.extend(buffer.push(&stream[offset..]));

        prop_assert_eq!(lines, messages);
        prop_assert_eq!(buffer.pending(), 0);
    }
}

#[test]
fn test_partial_line_is_retained() {
    let mut buffer = LineBuffer::new();
    assert!(buffer.push(b"{\"id\":1").is_empty());
    assert_eq!(buffer.pending(), 7);
    assert_eq!(buffer.push(b"}\r\n"), vec!["{\"id\":1}"]);
}
