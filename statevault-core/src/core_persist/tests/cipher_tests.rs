//! Cipher service tests

use crate::core_persist::cipher::{CipherError, CipherService};

const PASSPHRASE: &str = "HrN2t2nCr6pTkEy20221l2B3dOcPr4j2";

#[tokio::test]
async fn test_encrypt_decrypt_round_trip() {
    let cipher = CipherService::new(PASSPHRASE);
    cipher.init().await.unwrap();

    let plaintext = "My string test";
    let token = cipher.encrypt(plaintext).await.unwrap();

    assert_ne!(token, plaintext);
    assert!(token.contains(':'));
    assert_eq!(cipher.decrypt(&token).await.unwrap(), plaintext);
}

#[tokio::test]
async fn test_nonce_freshness_produces_distinct_tokens() {
    let cipher = CipherService::new(PASSPHRASE);

    let first = cipher.encrypt("same input").await.unwrap();
    let second = cipher.encrypt("same input").await.unwrap();

    assert_ne!(first, second);
    assert_eq!(cipher.decrypt(&first).await.unwrap(), "same input");
    assert_eq!(cipher.decrypt(&second).await.unwrap(), "same input");
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let cipher = CipherService::new(PASSPHRASE);
    cipher.init().await.unwrap();
    cipher.init().await.unwrap();

    let token = cipher.encrypt("still works").await.unwrap();
    assert_eq!(cipher.decrypt(&token).await.unwrap(), "still works");
}

#[tokio::test]
async fn test_malformed_tokens_are_rejected() {
    let cipher = CipherService::new(PASSPHRASE);

    for token in ["no separator", "a:b:c", "!!!:AAAA", "AAAA:!!!"] {
        let result = cipher.decrypt(token).await;
        assert!(
            matches!(result, Err(CipherError::MalformedToken(_))),
            "token {token:?} should be malformed"
        );
    }
}

#[tokio::test]
async fn test_tampered_ciphertext_fails_authentication() {
    let cipher = CipherService::new(PASSPHRASE);
    let token = cipher.encrypt("integrity matters").await.unwrap();

    // Flip a character inside the ciphertext half.
    let (nonce, ciphertext) = token.split_once(':').unwrap();
    let mut bytes = ciphertext.as_bytes().to_vec();
    bytes[0] = if bytes[0] == b'A' { b'B' } else { b'A' };
    let tampered = format!("{}:{}", nonce, String::from_utf8(bytes).unwrap());

    let result = cipher.decrypt(&tampered).await;
    assert!(matches!(
        result,
        Err(CipherError::AuthenticationFailed) | Err(CipherError::MalformedToken(_))
    ));
}

#[tokio::test]
async fn test_wrong_passphrase_fails_authentication() {
    let cipher = CipherService::new(PASSPHRASE);
    let token = cipher.encrypt("secret").await.unwrap();

    let other = CipherService::new("a completely different passphrase");
    let result = other.decrypt(&token).await;
    assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
}
