//! UULE encoding — the opaque Google URL parameter that simulates searching
//! from a named location.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Length character alphabet. The canonical name's byte length indexes into
/// this; names at 64 bytes or longer fall back to 'A'.
const LENGTH_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// `"City,State,United States"` — the canonical name Google expects.
pub fn canonical_location_name(city: &str, state: &str) -> String {
    format!("{},{},United States", city.trim(), state.trim())
}

/// Encode a canonical location name as `w+CAIQICI<len-char><base64(name)>`.
pub fn encode_uule(canonical_name: &str) -> String {
    let len_char = LENGTH_ALPHABET
        .get(canonical_name.len())
        .copied()
        .unwrap_or(b'A') as char;
    let encoded = STANDARD.encode(canonical_name);
    format!("w+CAIQICI{len_char}{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_shape() {
        assert_eq!(
            canonical_location_name("Boca Raton", "Florida"),
            "Boca Raton,Florida,United States"
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let name = canonical_location_name("Delray Beach", "Florida");
        assert_eq!(encode_uule(&name), encode_uule(&name));
    }

    #[test]
    fn length_char_indexes_alphabet() {
        // "Boca Raton,Florida,United States" is 32 bytes → index 32 → 'g'
        let name = canonical_location_name("Boca Raton", "Florida");
        assert_eq!(name.len(), 32);
        let uule = encode_uule(&name);
        assert!(uule.starts_with("w+CAIQICIg"), "got {uule}");
    }

    #[test]
    fn overlong_name_falls_back_to_a() {
        let name = "x".repeat(80);
        let uule = encode_uule(&name);
        assert!(uule.starts_with("w+CAIQICIA"));
    }

    #[test]
    fn payload_is_base64_of_name() {
        let name = canonical_location_name("Austin", "Texas");
        let uule = encode_uule(&name);
        let payload = &uule["w+CAIQICI".len() + 1..];
        assert_eq!(STANDARD.decode(payload).unwrap(), name.as_bytes());
    }
}
