//! Authorization code generation
//!
//! Codes are 32 bytes from the thread-local CSPRNG, URL-safe base64 encoded
//! without padding. 256 bits cannot be guessed or enumerated within a code's
//! lifetime. Uniqueness among outstanding codes is enforced by the session
//! store, which regenerates on collision.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;

/// Number of random bytes in a generated code.
pub const CODE_BYTES: usize = 32;

/// Source of authorization codes.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Default generator backed by `rand::rng()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0u8; CODE_BYTES];
        rand::rng().fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn code_is_url_safe_base64() {
        let code = RandomCodeGenerator.generate();
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(code.len(), 43);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "code must be safe to embed in a query string: {code}"
        );
    }

    #[test]
    fn codes_do_not_repeat() {
        let generator = RandomCodeGenerator;
        let codes: HashSet<String> = (0..1000).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn code_decodes_to_full_entropy() {
        let code = RandomCodeGenerator.generate();
        let decoded = URL_SAFE_NO_PAD.decode(&code).expect("valid base64url");
        assert_eq!(decoded.len(), CODE_BYTES);
    }
}
