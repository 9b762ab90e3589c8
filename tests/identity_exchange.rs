use autokey_ident::{
    generate_gq, generate_iff, generate_mv, iter_extension_fields, mv_client_type, revoke_mv, Association,
    ExchangeState, ExtensionField, Filestamp, IdentityContext, KeyFileName, KeyStore, KeyType, KeygenOptions,
    MemoryKeyStore, SchemeKind, TestParams, Verdict,
};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_chacha::ChaCha8Rng;
use rand_core::{OsRng, SeedableRng};

const GROUP: &str = "timekeepers";

struct Server {
    context: IdentityContext<TestParams>,
    signing_key: SigningKey,
}

impl Server {
    /// Answers every request in a datagram, returning the encoded responses.
    fn handle(&self, datagram: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for field in iter_extension_fields(datagram) {
            let request = field.unwrap();
            if let Some(response) = self
                .context
                .respond::<Signature>(&mut OsRng, &request, 0xe100_0000, &self.signing_key)
            {
                out.extend(response.encode().unwrap());
            }
        }
        out
    }

    fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }
}

/// Copies the named key files from the key generator to a client.
fn distribute(from: &MemoryKeyStore, key_types: &[KeyType]) -> MemoryKeyStore {
    let mut to = MemoryKeyStore::new();
    for &key_type in key_types {
        let file = from.latest(key_type, GROUP).unwrap();
        to.store(&file, &from.load(&file).unwrap()).unwrap();
    }
    to
}

fn run_exchange(
    server: &Server,
    client: &IdentityContext<TestParams>,
    association: &mut Association<TestParams>,
) -> Option<Verdict> {
    let request = association.challenge(&mut OsRng, client).unwrap();
    let datagram = server.handle(&request.encode().unwrap());
    let (response, consumed) = ExtensionField::decode(&datagram).unwrap();
    assert_eq!(consumed, datagram.len());
    association.receive_response::<Signature>(client, &response, server.verifying_key())
}

#[test_log::test]
fn full_cycle_through_key_files() {
    let mut keygen_store = MemoryKeyStore::new();
    let options = KeygenOptions::new(GROUP, Filestamp(3_900_000_000)).with_mv_clients(2);
    generate_iff::<TestParams>(&mut OsRng, &mut keygen_store, &options).unwrap();
    generate_gq::<TestParams>(&mut OsRng, &mut keygen_store, &options).unwrap();
    generate_mv::<TestParams>(&mut OsRng, &mut keygen_store, &options).unwrap();

    let server = Server {
        context: IdentityContext::from_store(&keygen_store, GROUP).unwrap(),
        signing_key: SigningKey::random(&mut OsRng),
    };
    assert_eq!(
        server.context.offered(),
        [SchemeKind::Gq, SchemeKind::Iff, SchemeKind::Mv]
    );

    // One client per scheme, each holding only its own client-side files.
    let clients = [
        (SchemeKind::Iff, vec![KeyType::IffKey]),
        (SchemeKind::Gq, vec![KeyType::GqKey]),
        (SchemeKind::Mv, vec![mv_client_type(1)]),
    ];
    for (scheme, files) in clients {
        let store = distribute(&keygen_store, &files);
        let client = IdentityContext::from_store(&store, GROUP).unwrap();
        assert!(client.offered().is_empty());

        let mut association = Association::new(17);
        association.certificate_trusted(&client, server.context.gq_public_key_bytes().as_deref());
        assert_eq!(association.negotiate(&client, &server.context.offered()), Some(scheme));

        assert_eq!(run_exchange(&server, &client, &mut association), Some(Verdict::Verified));
        assert!(association.is_proventic());
    }
}

#[test_log::test]
fn revoked_client_loses_proventic_status() {
    let mut keygen_store = MemoryKeyStore::new();
    let options = KeygenOptions::new(GROUP, Filestamp(1000)).with_mv_clients(3);
    generate_mv::<TestParams>(&mut OsRng, &mut keygen_store, &options).unwrap();

    let signing_key = SigningKey::random(&mut OsRng);
    let clients = (0..3)
        .map(|index| {
            let store = distribute(&keygen_store, &[mv_client_type(index)]);
            IdentityContext::<TestParams>::from_store(&store, GROUP).unwrap()
        })
        .collect::<Vec<_>>();
    let mut associations = (0..3u32).map(Association::new).collect::<Vec<_>>();

    let server = Server {
        context: IdentityContext::from_store(&keygen_store, GROUP).unwrap(),
        signing_key: signing_key.clone(),
    };
    for (client, association) in clients.iter().zip(associations.iter_mut()) {
        association.certificate_trusted(client, None);
        association.negotiate(client, &[SchemeKind::Mv]).unwrap();
        assert_eq!(run_exchange(&server, client, association), Some(Verdict::Verified));
        assert!(association.is_proventic());
    }

    let options = KeygenOptions::new(GROUP, Filestamp(2000));
    revoke_mv::<TestParams>(&mut keygen_store, &options, 1).unwrap();
    let server = Server {
        context: IdentityContext::from_store(&keygen_store, GROUP).unwrap(),
        signing_key,
    };

    for (index, (client, association)) in clients.iter().zip(associations.iter_mut()).enumerate() {
        association.reset();
        let expected = if index == 1 { Verdict::Failed } else { Verdict::Verified };
        assert_eq!(run_exchange(&server, client, association), Some(expected));
        assert_eq!(association.is_proventic(), index != 1);
        assert_eq!(association.state(), ExchangeState::Concluded(expected));
    }
}

#[test_log::test]
fn deterministic_keygen() {
    let options = KeygenOptions::new(GROUP, Filestamp(1000));

    let mut first = MemoryKeyStore::new();
    generate_iff::<TestParams>(&mut ChaCha8Rng::seed_from_u64(1), &mut first, &options).unwrap();
    let mut second = MemoryKeyStore::new();
    generate_iff::<TestParams>(&mut ChaCha8Rng::seed_from_u64(1), &mut second, &options).unwrap();

    let file = KeyFileName::new(KeyType::IffKey, GROUP, Filestamp(1000)).unwrap();
    assert_eq!(first.load(&file).unwrap(), second.load(&file).unwrap());
}
