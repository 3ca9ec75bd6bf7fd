use super::error::DescriptorError;
use super::fingerprint::Fingerprint;

/// A parsed `magnet:?xt=urn:btih:...` link: the fingerprint plus the
/// optional hints the link carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetUri {
    pub fingerprint: Fingerprint,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl MagnetUri {
    /// Parses a magnet link. The hash may be hex (40 chars) or base32
    /// (32 chars).
    pub fn parse(uri: &str) -> Result<Self, DescriptorError> {
        let query = uri
            .strip_prefix("magnet:?")
            .ok_or(DescriptorError::InvalidMagnet("not a magnet link"))?;

        let mut fingerprint = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "xt" => {
                    let hash = value
                        .strip_prefix("urn:btih:")
                        .ok_or(DescriptorError::InvalidMagnet("unsupported xt urn"))?;
                    let parsed = match hash.len() {
                        40 => Fingerprint::from_hex(hash)?,
                        32 => Fingerprint::from_bytes(&base32_decode(hash)?)?,
                        _ => return Err(DescriptorError::InvalidMagnet("bad hash length")),
                    };
                    fingerprint = Some(parsed);
                }
                "dn" => display_name = Some(percent_decode(value)),
                "tr" => trackers.push(percent_decode(value)),
                _ => {}
            }
        }

        Ok(MagnetUri {
            fingerprint: fingerprint.ok_or(DescriptorError::InvalidMagnet("missing xt"))?,
            display_name,
            trackers,
        })
    }
}

fn base32_decode(encoded: &str) -> Result<Vec<u8>, DescriptorError> {
    let mut acc = 0u32;
    let mut bits = 0u32;
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    for byte in encoded.bytes() {
        let value = match byte {
            b'A'..=b'Z' => byte - b'A',
            b'a'..=b'z' => byte - b'a',
            b'2'..=b'7' => byte - b'2' + 26,
            _ => return Err(DescriptorError::InvalidMagnet("bad base32 digit")),
        };
        acc = (acc << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    Ok(out)
}

fn percent_decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    #[test]
    fn parses_hex_magnet() {
        let uri = format!(
            "magnet:?xt=urn:btih:{HEX}&dn=debian%2012%20iso&tr=udp%3A%2F%2Ftracker.example%3A80"
        );
        let magnet = MagnetUri::parse(&uri).unwrap();
        assert_eq!(magnet.fingerprint.to_hex(), HEX);
        assert_eq!(magnet.display_name.as_deref(), Some("debian 12 iso"));
        assert_eq!(magnet.trackers, vec!["udp://tracker.example:80"]);
    }

    #[test]
    fn parses_base32_magnet() {
        // Same digest as HEX, base32-encoded.
        let uri = "magnet:?xt=urn:btih:YEX6DQDLXISUVHOJ6UM3GNNKPQJWPKEK";
        let magnet = MagnetUri::parse(uri).unwrap();
        assert_eq!(magnet.fingerprint.to_hex(), HEX);
        assert_eq!(magnet.display_name, None);
        assert!(magnet.trackers.is_empty());
    }

    #[test]
    fn rejects_malformed_links() {
        assert!(MagnetUri::parse("http://example.com").is_err());
        assert!(MagnetUri::parse("magnet:?dn=no-hash").is_err());
        assert!(MagnetUri::parse("magnet:?xt=urn:btih:tooshort").is_err());
        assert!(MagnetUri::parse("magnet:?xt=urn:sha1:abcdef").is_err());
    }
}
