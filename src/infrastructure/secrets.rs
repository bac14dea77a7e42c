//! Secret generation for fresh deployments

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::process::Command;

use super::process::run;
use crate::domain::config::Secrets;

const PASSWORD_LENGTH: usize = 20;
const ENCRYPTION_KEY_LENGTH: usize = 32;
const SUFFIX_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
    pub fingerprint: String,
}

#[async_trait]
pub trait SecretGenerator: Send + Sync {
    fn password(&self, length: usize) -> String;
    /// Lower-case letters, for usernames and database names
    fn suffix(&self) -> String;
    async fn ssh_keypair(&self, comment: &str) -> Result<KeyPair>;
}

/// Every secret a first deploy needs
pub async fn generate_secrets(generator: &dyn SecretGenerator, deployment: &str) -> Result<Secrets> {
    let keys = generator
        .ssh_keypair(deployment)
        .await
        .context("Failed to generate SSH keypair")?;
    Ok(Secrets {
        concourse_username: "admin".to_string(),
        concourse_password: generator.password(PASSWORD_LENGTH),
        director_username: "admin".to_string(),
        director_password: generator.password(PASSWORD_LENGTH),
        director_hm_user_password: generator.password(PASSWORD_LENGTH),
        director_mbus_password: generator.password(PASSWORD_LENGTH),
        director_nats_password: generator.password(PASSWORD_LENGTH),
        director_registry_password: generator.password(PASSWORD_LENGTH),
        encryption_key: generator.password(ENCRYPTION_KEY_LENGTH),
        grafana_password: generator.password(PASSWORD_LENGTH),
        rds_username: format!("admin{}", generator.suffix()),
        rds_password: generator.password(PASSWORD_LENGTH),
        rds_default_database_name: format!("bosh_{}", generator.suffix()),
        private_key: keys.private_key,
        public_key: keys.public_key,
        public_key_fingerprint: keys.fingerprint,
        ..Default::default()
    })
}

/// `rand` for passwords, `ssh-keygen` for the keypair
pub struct RandomSecrets {
    ssh_keygen: String,
}

impl RandomSecrets {
    pub fn new(ssh_keygen: impl Into<String>) -> Self {
        Self {
            ssh_keygen: ssh_keygen.into(),
        }
    }
}

#[async_trait]
impl SecretGenerator for RandomSecrets {
    fn password(&self, length: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }

    fn suffix(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..SUFFIX_LENGTH)
            .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
            .collect()
    }

    async fn ssh_keypair(&self, comment: &str) -> Result<KeyPair> {
        let dir = tempfile::tempdir().context("Failed to create temp directory")?;
        let key_path = dir.path().join("id_rsa");
        let key_arg = key_path.to_string_lossy().to_string();

        run(
            Command::new(&self.ssh_keygen).args(["-q", "-t", "rsa", "-b", "4096", "-N", "", "-C", comment, "-f", key_arg.as_str()]),
            "ssh-keygen",
        )
        .await?;

        let pub_arg = format!("{}.pub", key_arg);
        let listing = run(
            Command::new(&self.ssh_keygen).args(["-l", "-E", "md5", "-f", pub_arg.as_str()]),
            "ssh-keygen fingerprint",
        )
        .await?;

        Ok(KeyPair {
            private_key: tokio::fs::read_to_string(&key_path).await?,
            public_key: tokio::fs::read_to_string(&pub_arg).await?.trim().to_string(),
            fingerprint: parse_fingerprint(&listing)?,
        })
    }
}

/// `4096 MD5:aa:bb:... comment (RSA)` -> `aa:bb:...`
fn parse_fingerprint(listing: &str) -> Result<String> {
    listing
        .split_whitespace()
        .nth(1)
        .map(|f| f.trim_start_matches("MD5:").to_string())
        .with_context(|| format!("Unexpected ssh-keygen output: {}", listing.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSecrets;

    #[async_trait]
    impl SecretGenerator for FixedSecrets {
        fn password(&self, length: usize) -> String {
            "p".repeat(length)
        }

        fn suffix(&self) -> String {
            "abcdefgh".to_string()
        }

        async fn ssh_keypair(&self, _comment: &str) -> Result<KeyPair> {
            Ok(KeyPair {
                private_key: "private".to_string(),
                public_key: "ssh-rsa AAAA".to_string(),
                fingerprint: "aa:bb".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_generate_secrets_fills_every_generated_field() {
        let secrets = generate_secrets(&FixedSecrets, "spire-foo").await.unwrap();
        assert_eq!(secrets.concourse_username, "admin");
        assert_eq!(secrets.concourse_password.len(), PASSWORD_LENGTH);
        assert_eq!(secrets.encryption_key.len(), ENCRYPTION_KEY_LENGTH);
        assert_eq!(secrets.rds_username, "adminabcdefgh");
        assert_eq!(secrets.rds_default_database_name, "bosh_abcdefgh");
        assert_eq!(secrets.public_key_fingerprint, "aa:bb");
        assert!(secrets.credhub_password.is_empty());
    }

    #[test]
    fn test_random_passwords_are_alphanumeric_and_distinct() {
        let gen = RandomSecrets::new("ssh-keygen");
        let a = gen.password(20);
        let b = gen.password(20);
        assert_eq!(a.len(), 20);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
        assert!(gen.suffix().chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_parse_fingerprint() {
        let line = "4096 MD5:12:f8:7e:78:61:b4:bf:e2:de:24:15:96:4e:d4:72:53 spire-foo (RSA)\n";
        assert_eq!(
            parse_fingerprint(line).unwrap(),
            "12:f8:7e:78:61:b4:bf:e2:de:24:15:96:4e:d4:72:53"
        );
        assert!(parse_fingerprint("").is_err());
    }
}
