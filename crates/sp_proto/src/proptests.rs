//! Property-based tests for the message model.
//!
//! - Content canonical bytes round-trip exactly and re-encode identically
//! - Padding hides length within buckets and always unpads to the input
//! - Trimming a group message never touches the ciphertext

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::codec::{pad_to_bucket, unpad, PaddingMode, BUCKET_SIZES};
use crate::content::{Content, ContentBody};
use crate::envelope::Envelope;
use crate::id::Id;
use crate::message::{KeyDelivery, SecureMessage};

fn arb_body() -> impl Strategy<Value = ContentBody> {
    prop_oneof![
        ".{0,200}".prop_map(|text| ContentBody::Text { text }),
        ("[a-z]{1,12}\\.[a-z]{3}", proptest::option::of(prop::collection::vec(any::<u8>(), 0..64)))
            .prop_map(|(filename, data)| ContentBody::File { filename, url: None, data }),
        ("[a-z]{1,16}", prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6)).prop_map(
            |(command, args)| ContentBody::Command {
                command,
                args: args.into_iter().map(|(k, v)| (k, serde_json::Value::from(v))).collect(),
            }
        ),
        (".{0,40}", any::<u32>()).prop_map(|(text, sn)| ContentBody::Quote {
            text,
            original_sn: u64::from(sn),
            original_sender: Id::user("origin", "hub").unwrap(),
        }),
    ]
}

proptest! {
    /// from_bytes(to_bytes(c)) == c, and re-encoding is byte-exact.
    #[test]
    fn content_canonical_roundtrip(body in arb_body(), sn in any::<u64>()) {
        let content = Content::new(body).with_serial_number(sn);
        let bytes = content.to_bytes().unwrap();
        let decoded = Content::from_bytes(&bytes).unwrap();
        prop_assert_eq!(&decoded, &content);
        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    /// Bucket padding lands on a bucket boundary and is reversible.
    #[test]
    fn padding_lands_on_bucket(data in prop::collection::vec(any::<u8>(), 0..5000)) {
        let padded = pad_to_bucket(&data, PaddingMode::Buckets).unwrap();
        prop_assert!(BUCKET_SIZES.contains(&padded.len()));
        prop_assert_eq!(unpad(&padded).unwrap(), data.as_slice());
    }

    /// Trimming keeps ciphertext and hands each member only its own key.
    #[test]
    fn trim_preserves_ciphertext(
        ciphertext in prop::collection::vec(any::<u8>(), 1..128),
        names in prop::collection::btree_set("[a-z]{1,10}", 1..8),
    ) {
        let members: Vec<Id> = names.iter().map(|n| Id::user(n, "hub").unwrap()).collect();
        let keys: BTreeMap<Id, Vec<u8>> = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.clone(), vec![i as u8 + 1; 4]))
            .collect();
        let group = Id::group("g", "hub").unwrap();
        let envelope = Envelope::new(members[0].clone(), group, 1).unwrap();
        let delivery = KeyDelivery::PerMember(keys.clone());
        let msg = SecureMessage::new(envelope, ciphertext.clone(), delivery).unwrap();

        for copy in msg.split(&members).unwrap() {
            let member = copy.envelope().receiver().clone();
            prop_assert_eq!(copy.ciphertext(), ciphertext.as_slice());
            prop_assert_eq!(copy.encrypted_key(), keys.get(&member).map(Vec::as_slice));
        }
    }
}
