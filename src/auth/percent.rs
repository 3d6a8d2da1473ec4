//! RFC 3986 percent-encoding as required by OAuth 1.0a (RFC 5849 §3.6)
//!
//! Only the unreserved set `ALPHA / DIGIT / "-" / "." / "_" / "~"` passes
//! through; everything else, including space, is `%XX` with uppercase hex.
//! This is stricter than `application/x-www-form-urlencoded`, which turns
//! space into `+` and leaves `*` alone.

/// Percent-encode a string for use in a signature base string or header
pub fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreserved_pass_through() {
        let s = "AZaz09-._~";
        assert_eq!(encode(s), s);
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        assert_eq!(encode(":/?#[]@"), "%3A%2F%3F%23%5B%5D%40");
        assert_eq!(encode("!$&'()*+,;="), "%21%24%26%27%28%29%2A%2B%2C%3B%3D");
        assert_eq!(encode(" "), "%20");
        assert_eq!(encode("%"), "%25");
    }

    #[test]
    fn test_multibyte_utf8() {
        assert_eq!(encode("ü"), "%C3%BC");
        assert_eq!(encode("☃"), "%E2%98%83");
    }

    #[test]
    fn test_round_trip_reserved_set() {
        let reserved = ":/?#[]@!$&'()*+,;= %\"<>\\^`{|}";
        for c in reserved.chars() {
            let s = format!("a{}b", c);
            let encoded = encode(&s);
            assert_eq!(urlencoding::decode(&encoded).unwrap(), s, "round trip failed for {:?}", c);
        }
        let mixed = "Hello Ladies + Gentlemen, a signed OAuth request!";
        assert_eq!(
            encode(mixed),
            "Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21"
        );
        assert_eq!(urlencoding::decode(&encode(mixed)).unwrap(), mixed);
    }
}
