//! Provider lifecycle and file operation integration tests.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use ruststack_s3fs_core::{CopyOptions, S3FsError};

    use crate::{
        LOCAL_URI, cleanup_bucket, create_test_bucket, local_env, open_file_system, s3_client,
        s3fs_provider,
    };

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_second_open_until_closed() {
        let provider = s3fs_provider();
        let fs = open_file_system(&provider);
        assert!(fs.is_open());

        let err = provider
            .new_file_system(LOCAL_URI, &local_env())
            .expect_err("already open");
        assert!(matches!(err, S3FsError::AlreadyExists { .. }));

        provider.close(&fs);
        assert!(!fs.is_open());
        let reopened = provider
            .new_file_system(LOCAL_URI, &local_env())
            .expect("reopen after close");
        provider.close(&reopened);
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_create_move_and_delete_entries() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "ops").await;
        let provider = s3fs_provider();
        let fs = open_file_system(&provider);

        let dir = fs.path(&format!("/{bucket}/folder"), &[]);
        provider.create_directory(&dir).await.expect("mkdir");
        assert!(provider.exists(&dir).await.expect("exists"));

        let file = dir.resolve_str("a.txt");
        provider
            .write_all(&file, Bytes::from_static(b"abc"))
            .await
            .expect("write");
        let err = provider.delete(&dir).await.expect_err("non-empty");
        assert!(matches!(err, S3FsError::DirectoryNotEmpty { .. }));

        let moved = fs.path(&format!("/{bucket}/b.txt"), &[]);
        provider
            .move_path(&file, &moved, &CopyOptions::default())
            .await
            .expect("move");
        assert!(!provider.exists(&file).await.expect("exists"));
        assert_eq!(
            provider.read_all(&moved).await.expect("read").as_ref(),
            b"abc"
        );

        provider.delete(&dir).await.expect("delete empty dir");
        assert!(!provider.delete_if_exists(&dir).await.expect("delete again"));

        let roots = fs.root_directories().await.expect("roots");
        assert!(roots.iter().any(|p| p.to_string() == format!("/{bucket}")));

        provider.close(&fs);
        cleanup_bucket(&client, &bucket).await;
    }
}
