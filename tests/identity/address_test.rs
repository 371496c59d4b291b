use splitter::identity::{Address, AddressError, Keypair};

// ============================================================================
// DERIVATION
// ============================================================================

#[test]
fn test_address_is_deterministic_per_key() {
    let keypair = Keypair::generate();
    assert_eq!(keypair.address(), keypair.address());
    assert_eq!(
        Address::from_public_key(&keypair.public_key()),
        keypair.address()
    );
}

#[test]
fn test_derived_address_is_never_zero() {
    for _ in 0..32 {
        assert!(!Keypair::generate().address().is_zero());
    }
}

// ============================================================================
// PARSING
// ============================================================================

#[test]
fn test_parse_with_and_without_prefix() {
    let with_prefix = Address::parse("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap();
    let bare = Address::parse("abcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap();
    let upper = Address::parse("0XABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD").unwrap();

    assert_eq!(with_prefix, bare);
    assert_eq!(with_prefix, upper);
    assert_eq!(
        with_prefix.to_string(),
        "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd"
    );
}

#[test]
fn test_parse_zero_address() {
    let zero = Address::parse("0x0000000000000000000000000000000000000000").unwrap();
    assert!(zero.is_zero());
    assert_eq!(zero, Address::ZERO);
}

#[test]
fn test_parse_rejects_empty() {
    assert!(matches!(Address::parse(""), Err(AddressError::InvalidFormat(_))));
}

#[test]
fn test_parse_rejects_wrong_length() {
    assert_eq!(
        Address::parse("0x1234"),
        Err(AddressError::InvalidLength(2))
    );
}

#[test]
fn test_parse_rejects_non_hex() {
    assert!(matches!(
        Address::parse("0xzz00000000000000000000000000000000000000"),
        Err(AddressError::InvalidHex(_))
    ));
}

#[test]
fn test_from_str_matches_parse() {
    let text = "0x1111111111111111111111111111111111111111";
    let parsed: Address = text.parse().unwrap();
    assert_eq!(parsed, Address::from_bytes([0x11; 20]));
}
