//! Property-based tests for carelink token handling

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use carelink_core::auth::*;
use proptest::prelude::*;
use std::time::Duration;

const KEY: &[u8] = b"property-test-signing-key-000001";

fn codec(ttl: u64) -> TokenCodec {
    TokenCodec::new(SigningKey::from_bytes(KEY).unwrap(), Duration::from_secs(ttl))
}

fn subject() -> impl Strategy<Value = String> {
    "[a-z0-9._]{1,24}@[a-z]{1,12}\\.test"
}

proptest! {
    #[test]
    fn props_verify_succeeds_until_expiry(
        sub in subject(),
        issued in 0u64..4_000_000_000,
        ttl in 1u64..100_000,
        offset in 0u64..200_000,
    ) {
        let codec = codec(ttl);
        let principal = Principal::new(sub.clone(), RoleSet::of(&[RoleName::Patient]));
        let token = codec.generate_at(&principal, issued).unwrap();

        let now = issued + offset;
        let result = codec.verify_at(&token, now);
        if offset < ttl {
            let claims = result.unwrap();
            prop_assert_eq!(claims.sub, sub);
            prop_assert_eq!(claims.exp, issued + ttl);
        } else {
            prop_assert_eq!(result, Err(TokenError::Expired));
        }
    }

    #[test]
    fn props_bit_flip_in_payload_or_signature_is_rejected(
        sub in subject(),
        in_signature in any::<bool>(),
        byte_index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let codec = codec(3600);
        let principal = Principal::new(sub, RoleSet::of(&[RoleName::Doctor]));
        let token = codec.generate_at(&principal, 1_000).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let target = if in_signature { parts[2] } else { parts[1] };
        let mut bytes = URL_SAFE_NO_PAD.decode(target).unwrap();
        let i = byte_index.index(bytes.len());
        bytes[i] ^= 1 << bit;
        let flipped = URL_SAFE_NO_PAD.encode(&bytes);

        let forged = if in_signature {
            format!("{}.{}.{}", parts[0], parts[1], flipped)
        } else {
            format!("{}.{}.{}", parts[0], flipped, parts[2])
        };
        prop_assert_eq!(codec.verify_at(&forged, 1_000), Err(TokenError::BadSignature));
    }

    #[test]
    fn props_role_names_roundtrip_through_display(
        role in prop::sample::select(RoleName::ALL.to_vec()),
        prefixed in any::<bool>(),
    ) {
        let raw = if prefixed { format!("ROLE_{role}") } else { role.to_string() };
        prop_assert_eq!(raw.parse::<RoleName>().unwrap(), role);
    }
}
