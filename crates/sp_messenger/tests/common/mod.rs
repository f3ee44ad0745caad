#![allow(dead_code)]

use std::sync::Arc;

use sp_messenger::{Directory, KeyStore, KeyStoreConfig, LocalUser, Transceiver, TransceiverConfig};
use sp_proto::{Content, ContentBody, Envelope, Id, PlainMessage};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sp_messenger=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn id(s: &str) -> Id {
    s.parse().unwrap()
}

/// A user registered in `directory` with its own key store.
pub fn peer(directory: &Arc<Directory>, name: &str, config: TransceiverConfig) -> Transceiver {
    peer_with_store(directory, name, config, &KeyStoreConfig::default())
}

pub fn peer_with_store(
    directory: &Arc<Directory>,
    name: &str,
    config: TransceiverConfig,
    store: &KeyStoreConfig,
) -> Transceiver {
    let user = LocalUser::generate(id(name)).unwrap();
    directory.register_user(&user);
    Transceiver::new(user, directory.clone(), Arc::new(KeyStore::from_config(store)), config)
}

pub fn text(from: &Transceiver, to: &Id, body: &str) -> PlainMessage {
    let envelope = Envelope::now(from.user().id().clone(), to.clone()).unwrap();
    PlainMessage::new(envelope, Content::text(body))
}

pub fn text_of(plain: &PlainMessage) -> &str {
    match &plain.content.body {
        ContentBody::Text { text } => text,
        other => panic!("expected text content, got {other:?}"),
    }
}
