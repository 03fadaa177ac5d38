#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use oc_crypto::{open_with_keypair, Keypair, ScopedSecret};
    use oc_relay::peel;

    use crate::datafile::parse_route;
    use crate::onion::{build_onion, Hop};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_onion_peels_hop_by_hop(
            seeds in proptest::collection::vec(any::<[u8; 32]>(), 1..5),
            message in "[ -~\r\n]{0,300}",
        ) {
            let keys: Vec<Keypair> = seeds
                .iter()
                .map(|s| Keypair::from_seed(&ScopedSecret::copy_from(s)))
                .collect();
            let mut route: Vec<Hop> = keys
                .iter()
                .enumerate()
                .map(|(i, k)| Hop::new(format!("relay{i}.onion"), format!("pw{i}")).sealed_to(k.public()))
                .collect();
            route.push(Hop::new("dest.onion", "final"));

            let mut payload = build_onion(&route, &message).unwrap().payload;
            for (i, key) in keys.iter().enumerate() {
                let plaintext = String::from_utf8(open_with_keypair(key, &payload).unwrap()).unwrap();
                let (hop, rest) = peel(&plaintext).unwrap();
                prop_assert_eq!(&hop.address, &route[i + 1].address);
                payload = rest.into_bytes();
            }
            prop_assert_eq!(payload, message.into_bytes());
        }

        #[test]
        fn test_route_lines_round_trip(
            hops in proptest::collection::vec(("[a-z0-9.:]{1,30}", "[A-Za-z0-9]{1,16}"), 1..8),
        ) {
            let text: String = hops
                .iter()
                .map(|(a, p)| format!("{a} {p}\n# noise\n\n"))
                .collect();
            let entries = parse_route(&text).unwrap();
            prop_assert_eq!(entries.len(), hops.len());
            for (entry, (a, p)) in entries.iter().zip(&hops) {
                prop_assert_eq!(&entry.address, a);
                prop_assert_eq!(&entry.password, p);
            }
        }
    }
}
