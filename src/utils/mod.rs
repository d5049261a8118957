pub mod password;
pub mod validate;

pub use password::{BcryptHasher, PasswordHasher};

/// 日志里只保留令牌前缀
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{}…", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_prefix() {
        assert_eq!(mask_token("abcdefghijkl"), "abcdef…");
        assert_eq!(mask_token("ab"), "ab…");
    }
}
