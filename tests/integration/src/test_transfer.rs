//! Copy and upload integration tests.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use ruststack_s3fs_core::{BasicFileAttributes, CopyOptions};

    use crate::{cleanup_bucket, create_test_bucket, open_file_system, s3_client, s3fs_provider};

    const MIB: u64 = 1024 * 1024;

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_large_object_in_parts() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "mpcopy").await;
        let provider = s3fs_provider();
        let fs = open_file_system(&provider);

        let size = usize::try_from(17 * MIB).expect("fits");
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let source = fs.path(&format!("/{bucket}/source.bin"), &[]);
        provider
            .write_all(&source, Bytes::from(data.clone()))
            .await
            .expect("write source");

        let target = fs.path(&format!("/{bucket}/copy/target.bin"), &[]);
        let options = CopyOptions::builder().chunk_size(5 * MIB).build();
        provider.copy(&source, &target, &options).await.expect("copy");

        let attrs = provider.read_attributes(&target).await.expect("attrs");
        assert_eq!(attrs.size(), 17 * MIB);
        let copied = provider.read_all(&target).await.expect("read");
        assert_eq!(copied.as_ref(), data.as_slice());

        provider.close(&fs);
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_upload_local_file() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "upload").await;
        let provider = s3fs_provider();
        let fs = open_file_system(&provider);

        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("local.txt");
        tokio::fs::write(&local, b"local content").await.expect("write local");

        let target = fs.path(&format!("/{bucket}/uploaded.txt"), &[]);
        let outcome = provider.upload_file(&local, &target).await.expect("upload");
        assert_eq!(outcome.size, 13);
        assert!(!outcome.is_multipart());

        let body = provider.read_all(&target).await.expect("read");
        assert_eq!(body.as_ref(), b"local content");

        provider.close(&fs);
        cleanup_bucket(&client, &bucket).await;
    }
}
