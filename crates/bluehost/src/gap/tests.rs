//! Tests for GAP identity types

#[cfg(test)]
mod tests {
    use super::super::types::*;

    #[test]
    fn test_bd_addr_display() {
        // Wire order is LSB first, display is MSB first
        let addr = BdAddr::new([0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(addr.to_string(), "11:22:33:44:55:66");
    }

    #[test]
    fn test_bd_addr_parse() {
        let addr: BdAddr = "11:22:33:44:55:66".parse().unwrap();
        assert_eq!(addr.bytes, [0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);

        // Bare hex is accepted too
        let bare: BdAddr = "112233445566".parse().unwrap();
        assert_eq!(bare, addr);

        // Round trip through display
        let again: BdAddr = addr.to_string().parse().unwrap();
        assert_eq!(again, addr);
    }

    #[test]
    fn test_bd_addr_parse_errors() {
        assert_eq!(
            "11:22:33".parse::<BdAddr>(),
            Err(AddrParseError::InvalidLength(6))
        );
        assert!(matches!(
            "GG:22:33:44:55:66".parse::<BdAddr>(),
            Err(AddrParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_bd_addr_from_slice() {
        assert!(BdAddr::from_slice(&[1, 2, 3]).is_none());

        let addr = BdAddr::from_slice(&[1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(addr.bytes, [1, 2, 3, 4, 5, 6]);
    }
}
