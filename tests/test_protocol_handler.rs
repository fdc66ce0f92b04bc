use peerkv::protocol_handler::{
    deserialize_buffer, serialize_data, Decoded, FrameError, RESPType, MAX_FRAME_ELEMENTS,
    MAX_LINE_LENGTH, MAX_NESTING_DEPTH,
};
use rstest::rstest;

fn bulk(text: &str) -> RESPType {
    RESPType::BulkString(Some(text.as_bytes().to_vec()))
}

#[rstest]
// Simple String Cases
#[case(b"+PING", None)]
#[case(b"+OK\r\n", Some((RESPType::SimpleString("OK".to_string()), 5usize)))]
#[case(b"+OK\r\n+Next", Some((RESPType::SimpleString("OK".to_string()), 5usize)))]
// Error Test Cases
#[case(b"-ERR", None)]
#[case(b"-ERR\r\n", Some((RESPType::Error("ERR".to_string()), 6usize)))]
#[case(b"-ERR\r\n+Partial", Some((RESPType::Error("ERR".to_string()), 6usize)))]
// Integer Test Cases
#[case(b":20", None)]
#[case(b":20\r\n", Some((RESPType::Integer(20), 5usize)))]
#[case(b":-3\r\n+PING", Some((RESPType::Integer(-3), 5usize)))]
// Bulk String Test Cases
#[case(b"$5\r\nhello", None)]
#[case(b"$5\r\nhello\r", None)]
#[case(b"$0\r\n\r\n", Some((bulk(""), 6usize)))]
#[case(b"$-1\r\n", Some((RESPType::BulkString(None), 5usize)))]
#[case(b"$4\r\ntest\r\n", Some((bulk("test"), 10usize)))]
#[case(b"$4\r\ntest\r\n+Next", Some((bulk("test"), 10usize)))]
#[case(b"$4\r\na\r\nb\r\n", Some((bulk("a\r\nb"), 10usize)))]
#[case(b"$12\r\nhello world!\r\n", Some((bulk("hello world!"), 19usize)))]
// Array Test Cases
#[case(b"*0", None)]
#[case(b"*0\r\n", Some((RESPType::Array(vec![]), 4usize)))]
#[case(b"*2\r\n$5\r\nhello\r\n$5\r\nwor", None)]
#[case(b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n", Some((RESPType::Array(vec![bulk("hello"), bulk("world")]), 26usize)))]
#[case(b"*2\r\n*2\r\n+Hello\r\n$5\r\nWorld\r\n*3\r\n:1\r\n:2\r\n:3\r\n", Some((RESPType::Array(
    vec![
        RESPType::Array(vec![RESPType::SimpleString("Hello".to_string()), bulk("World")]),
        RESPType::Array(vec![RESPType::Integer(1), RESPType::Integer(2), RESPType::Integer(3)]),
    ]),
    43usize))
)]
// Empty Buffer
#[case(b"", None)]
fn deserialize_test(#[case] input: &[u8], #[case] expected: Decoded) {
    let actual: Decoded = deserialize_buffer(input).unwrap();
    assert_eq!(expected, actual);
}

#[rstest]
#[case(b"hello\r\n", FrameError::UnknownPrefix(b'h'))]
#[case(b"$abc\r\nfoo\r\n", FrameError::InvalidLength)]
#[case(b"$-2\r\n", FrameError::InvalidLength)]
#[case(b"*-1\r\n", FrameError::InvalidLength)]
#[case(b":12a\r\n", FrameError::InvalidInteger)]
#[case(b"$3\r\nfoobar\r\n", FrameError::MissingTerminator)]
#[case(b"$999999999999\r\n", FrameError::TooLarge(999_999_999_999))]
// A malformed element poisons the whole array
#[case(b"*2\r\n$3\r\nGET\r\n!oops\r\n", FrameError::UnknownPrefix(b'!'))]
fn deserialize_malformed_test(#[case] input: &[u8], #[case] expected: FrameError) {
    assert_eq!(deserialize_buffer(input), Err(expected));
}

#[rstest]
// Nesting up to the limit is still waiting for its innermost element
#[case(MAX_NESTING_DEPTH, Ok(None))]
#[case(MAX_NESTING_DEPTH + 1, Err(FrameError::TooDeep))]
// Rejected from the first limit-exceeding header, however much follows
#[case(200_000, Err(FrameError::TooDeep))]
fn nested_array_depth_test(#[case] depth: usize, #[case] expected: Result<Decoded, FrameError>) {
    let input: Vec<u8> = b"*1\r\n".repeat(depth);
    assert_eq!(deserialize_buffer(&input), expected);
}

#[test]
fn nested_array_at_depth_limit_decodes() {
    let mut input: Vec<u8> = b"*1\r\n".repeat(MAX_NESTING_DEPTH - 1);
    input.extend(b"*0\r\n");

    let (mut frame, used) = deserialize_buffer(&input).unwrap().unwrap();
    assert_eq!(used, input.len());

    let mut depth = 1;
    while let RESPType::Array(mut parts) = frame {
        match parts.pop() {
            Some(child) => {
                frame = child;
                depth += 1;
            }
            None => break,
        }
    }
    assert_eq!(depth, MAX_NESTING_DEPTH);
}

#[rstest]
#[case(format!("*{}\r\n", MAX_FRAME_ELEMENTS + 1), Err(FrameError::TooManyElements(MAX_FRAME_ELEMENTS + 1)))]
#[case(format!("*{}\r\n", MAX_FRAME_ELEMENTS), Ok(None))]
// The limit covers elements at every nesting level
#[case(format!("*2\r\n*{}\r\n", MAX_FRAME_ELEMENTS - 1), Err(FrameError::TooManyElements(MAX_FRAME_ELEMENTS - 1)))]
fn array_element_limit_test(#[case] input: String, #[case] expected: Result<Decoded, FrameError>) {
    assert_eq!(deserialize_buffer(input.as_bytes()), expected);
}

#[rstest]
#[case(MAX_LINE_LENGTH, Ok(None))]
#[case(MAX_LINE_LENGTH + 2, Err(FrameError::LineTooLong))]
fn unterminated_line_limit_test(#[case] length: usize, #[case] expected: Result<Decoded, FrameError>) {
    let mut input: Vec<u8> = vec![b'+'];
    input.extend(std::iter::repeat(b'a').take(length));
    assert_eq!(deserialize_buffer(&input), expected);
}

#[test]
fn line_at_length_limit_decodes() {
    let text: String = "a".repeat(MAX_LINE_LENGTH);
    let input: Vec<u8> = format!("+{}\r\n", text).into_bytes();

    assert_eq!(
        deserialize_buffer(&input),
        Ok(Some((RESPType::SimpleString(text), input.len())))
    );
}

#[rstest]
// Simple String Cases
#[case(RESPType::SimpleString("".to_string()), b"+\r\n".to_vec())]
#[case(RESPType::SimpleString("OK".to_string()), b"+OK\r\n".to_vec())]
#[case(RESPType::SimpleString("two\r\nlines".to_string()), b"+two  lines\r\n".to_vec())]
// Error Test Cases
#[case(RESPType::Error("".to_string()), b"-\r\n".to_vec())]
#[case(RESPType::Error("ERR".to_string()), b"-ERR\r\n".to_vec())]
// Integer Test Cases
#[case(RESPType::Integer(-1), b":-1\r\n".to_vec())]
#[case(RESPType::Integer(20), b":20\r\n".to_vec())]
// Bulk String Test Cases
#[case(bulk(""), b"$0\r\n\r\n".to_vec())]
#[case(RESPType::BulkString(None), b"$-1\r\n".to_vec())]
#[case(bulk("test"), b"$4\r\ntest\r\n".to_vec())]
#[case(RESPType::BulkString(Some(vec![0xff, 0x00, 0x0a])), b"$3\r\n\xff\x00\x0a\r\n".to_vec())]
// Array Test Cases
#[case(RESPType::Array(vec![bulk("hello"), bulk("world")]), b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n".to_vec())]
#[case(RESPType::Array(
    vec![
        RESPType::Array(vec![RESPType::SimpleString("Hello".to_string()), bulk("World")]),
        RESPType::Array(vec![RESPType::Integer(1), RESPType::Integer(2), RESPType::Integer(3)]),
    ]),
    b"*2\r\n*2\r\n+Hello\r\n$5\r\nWorld\r\n*3\r\n:1\r\n:2\r\n:3\r\n".to_vec()
)]
fn serialize_test(#[case] data: RESPType, #[case] expected: Vec<u8>) {
    assert_eq!(expected, serialize_data(&data));
}

#[test]
fn binary_bulk_string_is_decoded_verbatim() {
    let payload: Vec<u8> = (0u8..=255).collect();
    let encoded = serialize_data(&RESPType::BulkString(Some(payload.clone())));

    let (frame, used) = deserialize_buffer(&encoded).unwrap().unwrap();
    assert_eq!(frame, RESPType::BulkString(Some(payload)));
    assert_eq!(used, encoded.len());
}
