//! Opaque credential generators. These strings end up in passwords,
//! invite codes and API keys; formats are part of the external contract.

use rand::Rng;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHANUMERIC: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const API_KEY_PREFIX: &str = "ldp_";
const API_KEY_LEN: usize = 32;
const PASSWORD_LEN: usize = 16;
const TEMP_TOKEN_LEN: usize = 16;
const INVITE_CODE_LEN: usize = 24;

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

/// 16 letters, used as the root password of managed services and as the
/// RabbitMQ erlang cookie.
pub fn generate_password() -> String {
    random_string(LETTERS, PASSWORD_LEN)
}

/// Short-lived token for the log websocket handshake.
pub fn generate_temp_token() -> String {
    random_string(LETTERS, TEMP_TOKEN_LEN)
}

/// `ldp_` + 32 alphanumerics; the string is the credential.
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, random_string(ALPHANUMERIC, API_KEY_LEN))
}

pub fn generate_invite_code() -> String {
    random_string(ALPHANUMERIC, INVITE_CODE_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_format() {
        for _ in 0..32 {
            let key = generate_api_key();
            assert_eq!(key.len(), 4 + 32);
            assert!(key.starts_with("ldp_"));
            assert!(key[4..].chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn password_is_sixteen_letters() {
        for _ in 0..32 {
            let password = generate_password();
            assert_eq!(password.len(), 16);
            assert!(password.chars().all(|c| c.is_ascii_alphabetic()));
        }
    }

    #[test]
    fn temp_token_is_sixteen_letters() {
        let token = generate_temp_token();
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
