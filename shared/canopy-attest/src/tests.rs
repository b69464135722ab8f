#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use alloy_primitives::{address, b256, fixed_bytes, Address, Bytes, FixedBytes, B256, U256};
    use serde_json::json;
    use sha3::{Digest, Keccak256};

    use crate::{call_hash, CallIntent, RawCallIntent};

    const PINNED_CALL_HASH: B256 =
        b256!("4e6527343f9ae3ece622bf11fdaf2752b6e2d6ab57ac021c2a0b3b7fb714b42c");

    fn sample_intent() -> CallIntent {
        CallIntent::new(
            NonZeroU64::new(1).unwrap(),
            address!("0000000000000000000000000000000000000001"),
            address!("0000000000000000000000000000000000000002"),
            U256::ZERO,
            fixed_bytes!("abcdef01"),
            Bytes::new(),
            b256!("0000000000000000000000000000000000000000000000000000000000000001"),
        )
    }

    fn keccak256_bytes(bytes: &[u8]) -> B256 {
        let mut h = Keccak256::new();
        h.update(bytes);
        B256::from_slice(h.finalize().as_slice())
    }

    fn address_word(addr: Address) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..32].copy_from_slice(addr.as_slice());
        word
    }

    #[test]
    fn test_pinned_call_hash() {
        assert_eq!(call_hash(&sample_intent()), PINNED_CALL_HASH);
    }

    #[test]
    fn test_call_hash_matches_manual_abi_words() {
        let intent = sample_intent();

        let mut buf = Vec::with_capacity(32 * 6);
        buf.extend_from_slice(&U256::from(intent.chain_id()).to_be_bytes::<32>());
        buf.extend_from_slice(&address_word(intent.target()));
        buf.extend_from_slice(&address_word(intent.subject()));
        // bytes4 is left-aligned in its word
        let mut selector_word = [0u8; 32];
        selector_word[0..4].copy_from_slice(intent.selector().as_slice());
        buf.extend_from_slice(&selector_word);
        buf.extend_from_slice(&intent.value().to_be_bytes::<32>());
        buf.extend_from_slice(keccak256_bytes(intent.args()).as_slice());

        assert_eq!(call_hash(&intent), keccak256_bytes(&buf));
    }

    #[test]
    fn test_call_hash_is_deterministic() {
        let a = sample_intent();
        let b = sample_intent();
        assert_eq!(call_hash(&a), call_hash(&a));
        assert_eq!(call_hash(&a), call_hash(&b));
    }

    #[test]
    fn test_call_hash_is_sensitive_to_every_field() {
        let base = sample_intent();
        let chain = NonZeroU64::new(base.chain_id()).unwrap();
        let variants = [
            CallIntent::new(
                NonZeroU64::new(10).unwrap(),
                base.subject(),
                base.target(),
                base.value(),
                base.selector(),
                Bytes::copy_from_slice(base.args()),
                base.policy_id(),
            ),
            CallIntent::new(
                chain,
                address!("0000000000000000000000000000000000000003"),
                base.target(),
                base.value(),
                base.selector(),
                Bytes::copy_from_slice(base.args()),
                base.policy_id(),
            ),
            CallIntent::new(
                chain,
                base.subject(),
                address!("0000000000000000000000000000000000000003"),
                base.value(),
                base.selector(),
                Bytes::copy_from_slice(base.args()),
                base.policy_id(),
            ),
            CallIntent::new(
                chain,
                base.subject(),
                base.target(),
                U256::from(1u64),
                base.selector(),
                Bytes::copy_from_slice(base.args()),
                base.policy_id(),
            ),
            CallIntent::new(
                chain,
                base.subject(),
                base.target(),
                base.value(),
                fixed_bytes!("abcdef02"),
                Bytes::copy_from_slice(base.args()),
                base.policy_id(),
            ),
            CallIntent::new(
                chain,
                base.subject(),
                base.target(),
                base.value(),
                base.selector(),
                Bytes::from_static(&[0x00]),
                base.policy_id(),
            ),
        ];

        for variant in &variants {
            assert_ne!(call_hash(variant), PINNED_CALL_HASH, "{variant:?}");
        }
    }

    #[test]
    fn test_policy_id_is_not_part_of_the_call_hash() {
        // The policy id is bound by the capability payload, not by the call hash.
        let base = sample_intent();
        let other = CallIntent::new(
            NonZeroU64::new(1).unwrap(),
            base.subject(),
            base.target(),
            base.value(),
            base.selector(),
            Bytes::new(),
            B256::repeat_byte(0xee),
        );
        assert_eq!(call_hash(&other), PINNED_CALL_HASH);
    }

    #[test]
    fn test_target_precedes_subject() {
        let base = sample_intent();
        let swapped = CallIntent::new(
            NonZeroU64::new(1).unwrap(),
            base.target(),
            base.subject(),
            base.value(),
            base.selector(),
            Bytes::new(),
            base.policy_id(),
        );
        assert_eq!(
            call_hash(&swapped),
            b256!("f0a07c7fc6e8eb279b0694a7cd134ff781b8eb291c39b7c5bd23577a8c337ab7")
        );
    }

    #[test]
    fn test_validate_sample_wire_intent() {
        let raw: RawCallIntent = serde_json::from_value(json!({
            "chainId": 1,
            "subject": "0x0000000000000000000000000000000000000001",
            "target": "0x0000000000000000000000000000000000000002",
            "value": "0x0",
            "selector": "0xabcdef01",
            "args": "0x",
            "policyId": format!("0x{}1", "0".repeat(63)),
        }))
        .unwrap();

        let intent = raw.validate().unwrap();
        assert_eq!(intent, sample_intent());
        assert_eq!(call_hash(&intent), PINNED_CALL_HASH);
    }

    #[test]
    fn test_wire_rendering_revalidates_to_same_intent() {
        let intent = CallIntent::new(
            NonZeroU64::new(42161).unwrap(),
            address!("7E5F4552091A69125d5DfCb7b8C2659029395Bdf"),
            address!("00000000000000000000000000000000000000aa"),
            U256::from(1_000_000_000_000_000_000u128),
            FixedBytes::from([0xa9, 0x05, 0x9c, 0xbb]),
            Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
            B256::repeat_byte(0x11),
        );

        let json = intent.to_json();
        assert_eq!(json["value"], "0xde0b6b3a7640000");
        assert_eq!(json["args"], "0xdeadbeef");
        assert_eq!(json["subject"], "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");

        let back = RawCallIntent::from(&intent).validate().unwrap();
        assert_eq!(back, intent);
    }
}
