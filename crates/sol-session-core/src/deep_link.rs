use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything `encodeURIComponent` escapes.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const MOBILE_MARKERS: [&str; 8] = [
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    MOBILE_MARKERS.iter().any(|marker| ua.contains(marker))
}

pub fn encode_uri_component(raw: &str) -> String {
    utf8_percent_encode(raw, URI_COMPONENT).to_string()
}

/// Universal link that opens `page_url` inside the wallet's in-app browser.
pub fn browse_link(base: &str, page_url: &str) -> String {
    format!("{base}{}", encode_uri_component(page_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_agents_are_detected() {
        assert!(is_mobile_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15"
        ));
        assert!(is_mobile_user_agent("Mozilla/5.0 (Linux; Android 14; Pixel 8)"));
        assert!(is_mobile_user_agent("Opera/9.80 (J2ME/MIDP; Opera Mini/9.80)"));
        assert!(!is_mobile_user_agent(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/126.0 Safari/537.36"
        ));
    }

    #[test]
    fn encoding_matches_uri_component_rules() {
        assert_eq!(
            encode_uri_component("https://dapp.example/pay?to=a b&x=1"),
            "https%3A%2F%2Fdapp.example%2Fpay%3Fto%3Da%20b%26x%3D1"
        );
        assert_eq!(encode_uri_component("-_.!~*'()"), "-_.!~*'()");
    }

    #[test]
    fn browse_link_appends_encoded_page() {
        assert_eq!(
            browse_link("https://phantom.app/ul/browse/", "https://dapp.example/"),
            "https://phantom.app/ul/browse/https%3A%2F%2Fdapp.example%2F"
        );
    }
}
