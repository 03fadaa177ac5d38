#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::armor;
    use crate::envelope::{open, seal, EnvelopeError, MIN_ENVELOPE_LENGTH};
    use crate::keys::{to_exchange_public, to_exchange_secret, Keypair};
    use crate::secret::ScopedSecret;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_seal_open_round_trip(
            seed in any::<[u8; 32]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
        ) {
            let keypair = Keypair::from_seed(&ScopedSecret::copy_from(&seed));
            let envelope = seal(&keypair.exchange_public(), &plaintext).unwrap();
            let opened = open(&keypair.exchange_secret(), envelope.to_armored().as_bytes()).unwrap();
            prop_assert_eq!(opened, plaintext);
        }

        #[test]
        fn test_exchange_keys_agree(seed in any::<[u8; 32]>()) {
            let keypair = Keypair::from_seed(&ScopedSecret::copy_from(&seed));
            let secret = to_exchange_secret(&keypair.seed());
            let public = to_exchange_public(keypair.public().as_bytes()).unwrap();
            prop_assert_eq!(secret.public(), public);
        }

        #[test]
        fn test_bit_flip_after_ephemeral_key_fails(
            plaintext in proptest::collection::vec(any::<u8>(), 1..256),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let keypair = Keypair::generate();
            let mut bytes = seal(&keypair.exchange_public(), &plaintext).unwrap().to_bytes();

            // Nonce, ciphertext or tag.
            let idx = 32 + position.index(bytes.len() - 32);
            bytes[idx] ^= 1 << bit;

            let err = open(&keypair.exchange_secret(), armor::armor(&bytes).as_bytes()).unwrap_err();
            prop_assert!(matches!(err, EnvelopeError::Authentication));
        }

        #[test]
        fn test_short_input_rejected_before_crypto(
            bytes in proptest::collection::vec(any::<u8>(), 0..MIN_ENVELOPE_LENGTH),
        ) {
            let keypair = Keypair::generate();
            let err = open(&keypair.exchange_secret(), armor::armor(&bytes).as_bytes()).unwrap_err();
            let is_malformed = matches!(err, EnvelopeError::Malformed { len } if len == bytes.len());
            prop_assert!(is_malformed);
        }

        #[test]
        fn test_armor_round_trip(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let text = armor::armor(&data);
            prop_assert!(text.split("\r\n").all(|line| line.len() <= armor::LINE_WIDTH));
            prop_assert_eq!(armor::decode(text.as_bytes()).unwrap(), data);
        }
    }
}
