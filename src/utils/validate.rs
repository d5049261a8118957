//! 注册参数校验，返回面向用户的错误信息

pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err("用户名长度必须在3到50个字符之间".to_string());
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err("用户名格式无效，只允许使用字母、数字和下划线".to_string());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > 100 {
        return Err("邮箱长度不能超过100个字符".to_string());
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err("邮箱格式无效".to_string())
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 6 {
        return Err("密码长度不能少于6个字符".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
    }

    #[test]
    fn emails() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("ax.com").is_err());
        assert!(validate_email("a@x").is_err());
        assert!(validate_email("a@@x.com").is_err());
        assert!(validate_email("a b@x.com").is_err());
        assert!(validate_email("@x.com").is_err());
    }

    #[test]
    fn passwords() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("12345").is_err());
    }
}
