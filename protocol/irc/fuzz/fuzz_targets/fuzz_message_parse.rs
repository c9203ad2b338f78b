#![no_main]

use libfuzzer_sys::fuzz_target;
use protocol_irc::{Message, ParseError};

fuzz_target!(|data: &[u8]| {
    match Message::parse(data) {
        Ok((msg, consumed)) => {
            // A parsed line always ends at the first terminator
            assert!(consumed > 0 && consumed <= data.len());
            assert_eq!(data[consumed - 1], b'\n');
            assert!(!data[..consumed - 1].contains(&b'\n'));

            assert!(!msg.command.is_empty());
            assert!(msg.command.bytes().all(|b| b.is_ascii_alphanumeric()));

            if let Some(trailing) = msg.trailing() {
                assert!(trailing.len() <= msg.params.len());
            }
            if let Some(first) = msg.first_param() {
                assert!(first.len() <= msg.params.len());
            }
        }
        Err(ParseError::Incomplete) => {
            assert!(!data.contains(&b'\n'));
        }
        Err(ParseError::Invalid) => {
            assert!(data.contains(&b'\n'));
        }
    }
});
