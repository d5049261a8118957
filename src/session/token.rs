use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::SessionError;

/// 会话令牌的随机字节数（256位）
pub const TOKEN_BYTES: usize = 32;

/// 生成 URL 安全的随机会话令牌
///
/// 随机数直接取自操作系统，不检查碰撞。
pub fn generate_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionError::TokenGeneration(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
