#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::header::HopHeader;
    use crate::strip::{peel, split};

    fn address() -> impl Strategy<Value = String> {
        "[a-z2-7]{16}\\.onion(:[0-9]{2,5})?"
    }

    fn password() -> impl Strategy<Value = String> {
        "[A-Za-z0-9!#%&*+=?@^_-]{1,24}"
    }

    fn header_line() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,10}: [ -~]{0,40}"
            .prop_filter("must not look blank", |l| !l.trim().is_empty())
    }

    proptest! {
        #[test]
        fn test_header_round_trip(address in address(), password in password()) {
            let header = HopHeader::new(address, password);
            let parsed = HopHeader::parse(&[header.serialize()]).unwrap();
            prop_assert_eq!(parsed, header);
        }

        #[test]
        fn test_strip_removes_only_first_header(
            address in address(),
            password in password(),
            extra in proptest::collection::vec(header_line(), 0..4),
            body in "[ -~\n]{0,200}",
            crlf in any::<bool>(),
        ) {
            let eol = if crlf { "\r\n" } else { "\n" };
            let body = if crlf { body.replace('\n', "\r\n") } else { body };
            let first = HopHeader::new(address, password);

            let mut text = format!("{}{eol}", first.serialize());
            for line in &extra {
                text.push_str(line);
                text.push_str(eol);
            }
            text.push_str(eol);
            text.push_str(&body);

            let message = split(&text);
            prop_assert_eq!(message.header_lines.len(), extra.len() + 1);
            prop_assert_eq!(&message.body, &body);

            let (hop, rest) = peel(&text).unwrap();
            prop_assert_eq!(hop, first);

            // Everything after the first line, unchanged.
            let expected = if extra.is_empty() {
                body.clone()
            } else {
                text[text.find(eol).unwrap() + eol.len()..].to_string()
            };
            prop_assert_eq!(rest, expected);
        }

        #[test]
        fn test_strip_keeps_mixed_line_endings(
            address in address(),
            password in password(),
            extra in proptest::collection::vec((header_line(), any::<bool>()), 1..4),
            first_crlf in any::<bool>(),
            separator_crlf in any::<bool>(),
            body in "[ -~\r\n]{0,200}",
        ) {
            let eol = |crlf: bool| if crlf { "\r\n" } else { "\n" };
            let first = format!("{}{}", HopHeader::new(address, password).serialize(), eol(first_crlf));

            let mut rest = String::new();
            for (line, crlf) in &extra {
                rest.push_str(line);
                rest.push_str(eol(*crlf));
            }
            rest.push_str(eol(separator_crlf));
            rest.push_str(&body);

            let (_, stripped) = peel(&format!("{first}{rest}")).unwrap();
            prop_assert_eq!(stripped, rest);
        }

        #[test]
        fn test_wrong_token_count_rejected(address in address()) {
            let one_token = format!("X-OC-To: {address}");
            let glued = format!("X-OC-To:{address} pw");
            prop_assert!(HopHeader::parse(&[one_token]).is_err());
            prop_assert!(HopHeader::parse(&[glued]).is_err());
        }
    }
}
