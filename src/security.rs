use fernet::Fernet;

/// Handles encryption of subject passwords at rest.
///
/// Passwords are stored as Fernet tokens and only decrypted inside the
/// engine, right before they are typed into the portal's login form.
pub struct Secrets {
    fernet: Fernet,
}

impl Secrets {
    pub fn from_key(key: &str) -> Result<Self, String> {
        Fernet::new(key)
            .map(|fernet| Self { fernet })
            .ok_or_else(|| "FERNET_KEY is not a valid url-safe base64 fernet key".to_string())
    }

    pub fn encrypt_password(&self, plain: &str) -> String {
        self.fernet.encrypt(plain.as_bytes())
    }

    pub fn decrypt_password(&self, token: &str) -> Result<String, String> {
        let bytes = self
            .fernet
            .decrypt(token)
            .map_err(|_| "stored password could not be decrypted".to_string())?;
        String::from_utf8(bytes).map_err(|_| "decrypted password is not valid UTF-8".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trips() {
        let secrets = Secrets::from_key(&Fernet::generate_key()).unwrap();
        let token = secrets.encrypt_password("hunter2");
        assert_ne!(token, "hunter2");
        assert_eq!(secrets.decrypt_password(&token).unwrap(), "hunter2");
    }

    #[test]
    fn rejects_bad_key() {
        assert!(Secrets::from_key("not-a-key").is_err());
    }

    #[test]
    fn rejects_garbage_token() {
        let secrets = Secrets::from_key(&Fernet::generate_key()).unwrap();
        assert!(secrets.decrypt_password("garbage").is_err());
    }
}
