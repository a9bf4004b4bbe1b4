//! Serialization round trips and sealing.

use rand::rngs::StdRng;
use rand::SeedableRng;
use sigil::error;
use sigil::{Algorithm, Authorizer, BlockBuilder, KeyPair, Token, UnverifiedToken};

fn setup(seed: u64) -> (StdRng, KeyPair, Token) {
    let mut rng = StdRng::seed_from_u64(seed);
    let root = KeyPair::generate(Algorithm::Ed25519, &mut rng);
    let token = Token::new_with_rng(
        &mut rng,
        &root.private(),
        None,
        Algorithm::Ed25519,
        BlockBuilder::new().fact("user(1234);").unwrap(),
    )
    .unwrap();
    (rng, root, token)
}

#[test]
fn encode_decode_is_byte_exact() {
    let (mut rng, root, token) = setup(1);
    let token = token
        .attenuate_with_rng(
            &mut rng,
            Algorithm::Secp256r1,
            BlockBuilder::new()
                .fact("tenant(\"acme\");")
                .unwrap()
                .check("check if operation(\"read\");")
                .unwrap(),
        )
        .unwrap();

    let bytes = token.serialize();
    let decoded = Token::from_bytes(&bytes, root.public()).unwrap();
    assert_eq!(decoded.serialize(), bytes);

    // and again through base64
    let encoded = decoded.serialize_base64();
    let decoded = Token::from_base64(&encoded, root.public()).unwrap();
    assert_eq!(decoded.serialize(), bytes);
}

#[test]
fn decoded_tokens_keep_their_programs() {
    let (mut rng, root, token) = setup(2);
    let token = token
        .attenuate_with_rng(
            &mut rng,
            Algorithm::Ed25519,
            BlockBuilder::new()
                .check("check if operation(\"read\");")
                .unwrap(),
        )
        .unwrap();

    let decoded = Token::from_bytes(&token.serialize(), root.public()).unwrap();
    assert_eq!(decoded.print_block_source(0).unwrap(), "user(1234);");
    assert_eq!(
        decoded.print_block_source(1).unwrap(),
        "check if operation(\"read\");"
    );
}

#[test]
fn sealed_roundtrip_authorizes_like_the_original() {
    let (mut rng, root, token) = setup(3);
    let token = token
        .attenuate_with_rng(
            &mut rng,
            Algorithm::Ed25519,
            BlockBuilder::new()
                .check("check if operation(\"read\");")
                .unwrap(),
        )
        .unwrap();

    let mut authorizer = Authorizer::new();
    authorizer
        .add_code("operation(\"read\"); allow if user(1234);")
        .unwrap();

    let sealed = token.seal().unwrap();
    let decoded = Token::from_bytes(&sealed.serialize(), root.public()).unwrap();
    assert!(decoded.is_sealed());

    // sealing changes nothing about the decision
    assert_eq!(
        token.authorize(&authorizer).unwrap(),
        decoded.authorize(&authorizer).unwrap()
    );

    // but makes attenuation impossible, decoded or not
    assert!(matches!(
        decoded.attenuate_with_rng(&mut rng, Algorithm::Ed25519, BlockBuilder::new()),
        Err(error::Token::CannotAttenuateSealedToken)
    ));

    // the byte-exact property holds for sealed tokens too
    let bytes = sealed.serialize();
    let decoded = Token::from_bytes(&bytes, root.public()).unwrap();
    assert_eq!(decoded.serialize(), bytes);
}

#[test]
fn unverified_tokens_roundtrip_and_upgrade() {
    let (mut rng, root, token) = setup(4);
    let unverified = UnverifiedToken::from_base64(token.serialize_base64()).unwrap();
    let attenuated = unverified
        .attenuate_with_rng(
            &mut rng,
            Algorithm::Ed25519,
            BlockBuilder::new().fact("tenant(7);").unwrap(),
        )
        .unwrap();
    let verified = attenuated.verify(root.public()).unwrap();
    assert_eq!(verified.block_count(), 2);
}

#[test]
fn corrupted_tokens_are_rejected() {
    let (_, root, token) = setup(5);
    let mut bytes = token.serialize();
    // flip a byte inside the authority payload
    bytes[10] ^= 0x40;
    assert!(Token::from_bytes(&bytes, root.public()).is_err());
}

#[test]
fn mixed_algorithm_chains_roundtrip() {
    let mut rng = StdRng::seed_from_u64(6);
    let root = KeyPair::generate(Algorithm::Secp256r1, &mut rng);
    let token = Token::new_with_rng(
        &mut rng,
        &root.private(),
        None,
        Algorithm::Secp256r1,
        BlockBuilder::new().fact("user(1);").unwrap(),
    )
    .unwrap();
    let token = token
        .attenuate_with_rng(
            &mut rng,
            Algorithm::Ed25519,
            BlockBuilder::new().fact("tenant(2);").unwrap(),
        )
        .unwrap();

    let decoded = Token::from_bytes(&token.serialize(), root.public()).unwrap();
    assert_eq!(decoded.block_count(), 2);

    let sealed = decoded.seal().unwrap();
    Token::from_bytes(&sealed.serialize(), root.public()).unwrap();
}
