// =============================================================================
// Session id generation
// =============================================================================

use crate::types::Side;

/// Mint a fresh session id: the side name followed by 8 lowercase hex
/// digits, e.g. `buy_1a2b3c4d`. Drawn from a UUID v4 so ids collide with
/// the same astronomically low probability as any other UUID-keyed
/// identifier in this codebase, without pulling in a separate `rand`
/// dependency.
pub fn new_session_id(side: Side) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", side.as_str(), &raw[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_expected_shape() {
        let id = new_session_id(Side::Buy);
        assert!(id.starts_with("buy_"));
        let hex = &id["buy_".len()..];
        assert_eq!(hex.len(), 8);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_are_not_trivially_repeated() {
        let a = new_session_id(Side::Sell);
        let b = new_session_id(Side::Sell);
        assert_ne!(a, b);
    }
}
