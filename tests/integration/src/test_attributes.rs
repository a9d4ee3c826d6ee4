//! Attribute resolution integration tests.

#[cfg(test)]
mod tests {
    use ruststack_s3fs_core::BasicFileAttributes;

    use crate::{
        cleanup_bucket, create_test_bucket, open_file_system, put_objects, s3_client,
        s3fs_provider,
    };

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_resolve_file_and_virtual_directory() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "attrs").await;
        put_objects(&client, &bucket, &["docs/readme.txt"], b"hello").await;

        let provider = s3fs_provider();
        let fs = open_file_system(&provider);

        let file = fs.path(&format!("/{bucket}/docs/readme.txt"), &[]);
        let attrs = provider.read_attributes(&file).await.expect("file attrs");
        assert!(attrs.is_regular_file());
        assert_eq!(attrs.size(), 5);

        let dir = fs.path(&format!("/{bucket}/docs"), &[]);
        let attrs = provider.read_attributes(&dir).await.expect("dir attrs");
        assert!(attrs.is_directory());

        let missing = fs.path(&format!("/{bucket}/nope"), &[]);
        let err = provider.read_attributes(&missing).await.expect_err("missing");
        assert!(err.is_not_found());

        provider.close(&fs);
        cleanup_bucket(&client, &bucket).await;
    }
}
