//! Binary synchronisation: download an asset, predict its content-address,
//! upload only if the destination lacks it.

use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::contract::{Change, DiffEntry, SourceClient, TreeService};
use crate::error::SyncError;
use crate::fetch::RetryPolicy;

/// Content-address the destination assigns to `bytes`: SHA-1 over
/// `"blob <len>\0"` followed by the bytes, hex encoded.
pub fn blob_address(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Resolve one pending binary at `path` into an entry that points at its object.
///
/// Only call this for paths a diff has reported as changed.
pub async fn sync_binary<S, T>(
    source: &S,
    tree: &T,
    retry: &RetryPolicy,
    download_url: &str,
    path: &str,
) -> Result<DiffEntry, SyncError>
where
    S: SourceClient + ?Sized,
    T: TreeService + ?Sized,
{
    info!(url = download_url, "Downloading binary");
    let bytes = retry.run(download_url, || source.get_bytes(download_url)).await?;

    let predicted = blob_address(&bytes);
    let address = if tree.object_exists(&predicted).await? {
        debug!(path, address = %predicted, "Object already stored, skipping upload");
        predicted
    } else {
        let created = tree.create_object(&bytes).await?;
        debug!(path, address = %created, size = bytes.len(), "Uploaded object");
        created
    };

    Ok(DiffEntry {
        path: path.to_string(),
        change: Change::Blob(address),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockSourceClient, MockTreeService};
    use mockall::Sequence;

    #[test]
    fn blob_address_matches_git_hash_object() {
        // `printf 'hello world' | git hash-object --stdin`
        assert_eq!(blob_address(b"hello world"), "95d09f2b10159347eece71399a7e2e907ea3df4f");
        // `git hash-object /dev/null`
        assert_eq!(blob_address(b""), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[tokio::test]
    async fn skips_upload_when_object_exists() {
        let mut source = MockSourceClient::new();
        source
            .expect_get_bytes()
            .times(1)
            .returning(|_| Ok(b"hello world".to_vec()));
        let mut tree = MockTreeService::new();
        tree.expect_object_exists()
            .withf(|address| address == "95d09f2b10159347eece71399a7e2e907ea3df4f")
            .times(1)
            .returning(|_| Ok(true));
        tree.expect_create_object().never();

        let entry = sync_binary(&source, &tree, &RetryPolicy::immediate(0), "https://x/a.jpg", "media/a.jpg")
            .await
            .expect("sync should succeed");
        assert_eq!(entry.path, "media/a.jpg");
        assert_eq!(entry.change, Change::Blob("95d09f2b10159347eece71399a7e2e907ea3df4f".into()));
    }

    #[tokio::test]
    async fn uploads_missing_object_and_uses_returned_address() {
        let mut source = MockSourceClient::new();
        source.expect_get_bytes().returning(|_| Ok(vec![1, 2, 3]));
        let mut tree = MockTreeService::new();
        tree.expect_object_exists().returning(|_| Ok(false));
        tree.expect_create_object()
            .withf(|bytes| bytes == [1, 2, 3])
            .times(1)
            .returning(|_| Ok("abc123".into()));

        let entry = sync_binary(&source, &tree, &RetryPolicy::immediate(0), "https://x/b.pdf", "media/b.pdf")
            .await
            .unwrap();
        assert_eq!(entry.change, Change::Blob("abc123".into()));
    }

    #[tokio::test]
    async fn existence_check_failure_propagates() {
        let mut source = MockSourceClient::new();
        source.expect_get_bytes().returning(|_| Ok(vec![0]));
        let mut tree = MockTreeService::new();
        tree.expect_object_exists().returning(|_| Err(SyncError::Destination("HTTP 500".into())));
        tree.expect_create_object().never();

        let result = sync_binary(&source, &tree, &RetryPolicy::immediate(0), "https://x/c.png", "media/c.png").await;
        assert!(matches!(result, Err(SyncError::Destination(_))));
    }

    #[tokio::test]
    async fn retries_transient_download_failure() {
        let mut seq = Sequence::new();
        let mut source = MockSourceClient::new();
        source
            .expect_get_bytes()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|url| {
                Err(SyncError::Status {
                    url: url.to_string(),
                    status: 503,
                    body: "busy".into(),
                })
            });
        source
            .expect_get_bytes()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(b"hello world".to_vec()));
        let mut tree = MockTreeService::new();
        tree.expect_object_exists().returning(|_| Ok(false));
        tree.expect_create_object()
            .times(1)
            .returning(|bytes| Ok(blob_address(bytes)));

        let entry = sync_binary(&source, &tree, &RetryPolicy::immediate(2), "https://x/d.jpg", "media/d.jpg")
            .await
            .expect("second attempt should succeed");
        assert_eq!(entry.change, Change::Blob("95d09f2b10159347eece71399a7e2e907ea3df4f".into()));
    }

    #[tokio::test]
    async fn missing_download_is_not_retried() {
        let mut source = MockSourceClient::new();
        source.expect_get_bytes().times(1).returning(|url| {
            Err(SyncError::Status {
                url: url.to_string(),
                status: 404,
                body: String::new(),
            })
        });
        let mut tree = MockTreeService::new();
        tree.expect_object_exists().never();

        let result = sync_binary(&source, &tree, &RetryPolicy::immediate(3), "https://x/e.jpg", "media/e.jpg").await;
        assert!(matches!(result, Err(SyncError::Status { status: 404, .. })));
    }
}
