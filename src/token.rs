use base64ct::{Base64Url, Encoding};
use rand::{rngs::OsRng, RngCore};

/// 32 bytes gives 256^32 possible remember tokens.
pub const REMEMBER_TOKEN_BYTES: usize = 32;

/// `n` bytes from the OS CSPRNG.
pub fn bytes(n: usize) -> anyhow::Result<Vec<u8>> {
    let mut b = vec![0u8; n];
    OsRng.try_fill_bytes(&mut b)?;
    Ok(b)
}

/// Base64url encoding of `n` random bytes.
pub fn string(n: usize) -> anyhow::Result<String> {
    Ok(Base64Url::encode_string(&bytes(n)?))
}

pub fn remember_token() -> anyhow::Result<String> {
    string(REMEMBER_TOKEN_BYTES)
}

/// Number of bytes encoded in a base64url token.
pub fn n_bytes(token: &str) -> anyhow::Result<usize> {
    let b = Base64Url::decode_vec(token).map_err(|e| anyhow::anyhow!("decode token: {e}"))?;
    Ok(b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_token_carries_32_bytes() {
        let t = remember_token().unwrap();
        assert_eq!(n_bytes(&t).unwrap(), REMEMBER_TOKEN_BYTES);
    }

    #[test]
    fn tokens_are_unique() {
        let a = remember_token().unwrap();
        let b = remember_token().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn n_bytes_rejects_garbage() {
        assert!(n_bytes("%%%").is_err());
        assert_eq!(n_bytes(&string(10).unwrap()).unwrap(), 10);
    }
}
