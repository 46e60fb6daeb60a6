use anyhow::Context;
use ledger_core::Wallet;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

/// Loads the node's signing key from `path`, a hex secp256k1 secret key.
/// A missing file is created with a fresh key.
pub async fn load_or_create(path: &Path) -> anyhow::Result<Wallet> {
    match tokio::fs::read_to_string(path).await {
        Ok(secret_hex) => {
            let wallet = Wallet::from_secret_hex(&secret_hex)
                .with_context(|| format!("invalid key in {}", path.display()))?;
            info!(path = %path.display(), address = wallet.address(), "loaded wallet key");
            Ok(wallet)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let wallet = Wallet::generate();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            tokio::fs::write(path, wallet.secret_hex())
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), address = wallet.address(), "created wallet key");
            Ok(wallet)
        }
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn creates_then_reloads_the_same_key() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("wallet").join("private_key");
        assert!(!path.exists());

        let created = load_or_create(&path).await?;
        let reloaded = load_or_create(&path).await?;
        assert_eq!(created.address(), reloaded.address());

        tokio::fs::write(&path, "not hex").await?;
        assert!(load_or_create(&path).await.is_err());
        Ok(())
    }
}
